/// `marshal/array.rs`: Lua sequences <-> contiguous native buffers
///
/// Two ownership regimes meet here. Buffers built from script input are
/// owned by the binding (`ScopedBuffer`) and released when the bound call
/// returns, whichever path it returns by. Buffers handed out by the native
/// library are copied into fresh tables with `encode_array` and then given
/// back to the library by the caller.
use std::{mem, ptr, slice};

use mlua::{Lua, Result as LuaResult, Table, Value};

use crate::{error::BindError, marshal::values::Marshal};

/// Temporary element buffer passed into one native call.
#[derive(Debug)]
pub struct ScopedBuffer<T> {
    items: Vec<T>,
}

impl<T> ScopedBuffer<T> {
    /// Null for an empty buffer, matching what the native side expects for
    /// "no elements".
    pub fn as_ptr(&self) -> *const T {
        if self.items.is_empty() {
            ptr::null()
        } else {
            self.items.as_ptr()
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Decode a 1-based Lua sequence into a contiguous buffer.
///
/// The capacity is reserved up front with a fallible reservation so an
/// impossible length fails before any element is touched. Elements decode
/// in sequence order; the first bad one aborts with its index in the path.
pub fn decode_array<T: Marshal>(seq: &Table) -> Result<ScopedBuffer<T>, BindError> {
    let count = seq.raw_len();
    if count == 0 {
        return Ok(ScopedBuffer { items: Vec::new() });
    }

    let mut items = Vec::new();
    items.try_reserve_exact(count).map_err(|_| {
        log::warn!("cannot reserve {} bytes for a {count}-element array", byte_len::<T>(count));
        BindError::AllocationFailure { count, element: T::EXPECTED }
    })?;

    for i in 1..=count {
        let path = format!("[{i}]");
        let value: Value = seq.raw_get(i).map_err(|_| BindError::SchemaMismatch {
            field: path.clone(),
            expected: T::EXPECTED,
        })?;
        items.push(T::from_lua_value(value, &path)?);
    }
    Ok(ScopedBuffer { items })
}

/// Copy `count` elements starting at `ptr` into a new Lua sequence.
///
/// A null pointer or a zero count yields an empty table.
///
/// # Safety
/// When non-null, `ptr` must be valid for reads of `count` elements of `T`.
pub unsafe fn encode_array<T: Marshal>(lua: &Lua, ptr: *const T, count: usize) -> LuaResult<Table> {
    if ptr.is_null() || count == 0 {
        return lua.create_table();
    }
    // SAFETY: guaranteed by the caller.
    let items = unsafe { slice::from_raw_parts(ptr, count) };
    encode_slice(lua, items)
}

pub fn encode_slice<T: Marshal>(lua: &Lua, items: &[T]) -> LuaResult<Table> {
    let table = lua.create_table_with_capacity(items.len(), 0)?;
    for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, item.to_lua_value(lua)?)?;
    }
    Ok(table)
}

fn byte_len<T>(count: usize) -> usize {
    count.saturating_mul(mem::size_of::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::values::{Color, Vector2};

    #[test]
    fn empty_sequence_gives_null_and_zero() {
        let lua = Lua::new();
        let t = lua.create_table().unwrap();
        let buf = decode_array::<Vector2>(&t).unwrap();
        assert!(buf.as_ptr().is_null());
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn points_round_trip_in_order() {
        let lua = Lua::new();
        for n in [1usize, 2, 37] {
            let points: Vec<Vector2> =
                (0..n).map(|i| Vector2::new(i as f32, -(i as f32) * 0.5)).collect();
            let table = encode_slice(&lua, &points).unwrap();
            let buf = decode_array::<Vector2>(&table).unwrap();
            assert_eq!(buf.as_slice(), points.as_slice(), "n = {n}");
            assert!(!buf.as_ptr().is_null());
        }
    }

    #[test]
    fn bad_element_reports_its_index() {
        let lua = Lua::new();
        let t: Table = lua
            .load("return { {x=1,y=1}, {x=2}, {x=3,y=3} }")
            .eval()
            .unwrap();
        assert_eq!(
            decode_array::<Vector2>(&t).unwrap_err(),
            BindError::SchemaMismatch { field: "[2].y".into(), expected: "number" }
        );
    }

    #[test]
    fn scalar_elements_decode() {
        let lua = Lua::new();
        let t: Table = lua.load("return { 65, 66, 0x1F600 }").eval().unwrap();
        let buf = decode_array::<i32>(&t).unwrap();
        assert_eq!(buf.as_slice(), &[65, 66, 0x1F600]);

        let bad: Table = lua.load("return { 1, 'two' }").eval().unwrap();
        assert!(matches!(
            decode_array::<i32>(&bad),
            Err(BindError::SchemaMismatch { field, .. }) if field == "[2]"
        ));
    }

    #[test]
    fn null_or_zero_count_encodes_empty() {
        let lua = Lua::new();
        let colors = [Color::RED, Color::BLUE];
        let empty = unsafe { encode_array::<Color>(&lua, ptr::null(), 5) }.unwrap();
        assert_eq!(empty.raw_len(), 0);
        let zero = unsafe { encode_array(&lua, colors.as_ptr(), 0) }.unwrap();
        assert_eq!(zero.raw_len(), 0);
        let two = unsafe { encode_array(&lua, colors.as_ptr(), 2) }.unwrap();
        assert_eq!(two.raw_len(), 2);
        assert_eq!(two.get::<Color>(2).unwrap(), Color::BLUE);
    }

    #[test]
    fn byte_len_saturates() {
        assert_eq!(byte_len::<Vector2>(3), 24);
        assert_eq!(byte_len::<u64>(usize::MAX), usize::MAX);
    }
}
