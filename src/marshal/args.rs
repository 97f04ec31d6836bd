/// `marshal/args.rs`: positional argument access for bound functions
///
/// Bound functions receive their arguments as a raw `MultiValue` and pull
/// each one out through `Args`, so every failure carries the function name
/// and the 1-based position the script used.
use std::ffi::c_void;

use mlua::{AnyUserData, Function, IntoLuaMulti, Lua, MultiValue, Result as LuaResult, Table, Value};

use crate::{
    error::BindError,
    marshal::{
        array::{decode_array, ScopedBuffer},
        handle::{self, NativeResource},
        values::Marshal,
    },
};

pub struct Args {
    function: &'static str,
    values: Vec<Value>,
}

impl Args {
    pub fn new(function: &'static str, values: MultiValue) -> Self {
        Self { function, values: values.into_iter().collect() }
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn raw(&self, position: usize) -> Value {
        position
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    fn wrong_kind(&self, position: usize, expected: &'static str, got: &Value) -> BindError {
        BindError::ArgumentType {
            function: self.function,
            position,
            expected,
            got: got.type_name().to_string(),
        }
    }

    /// Any marshalled value: scalars and plain-value tables.
    ///
    /// A value of the wrong Lua kind is an argument type error; a table with
    /// a bad field is a schema mismatch tagged with this position.
    pub fn get<T: Marshal>(&self, position: usize) -> Result<T, BindError> {
        let value = self.raw(position);
        match T::from_lua_value(value.clone(), "") {
            Ok(v) => Ok(v),
            Err(BindError::SchemaMismatch { field, .. }) if field.is_empty() => {
                Err(self.wrong_kind(position, T::EXPECTED, &value))
            }
            Err(e) => Err(e.at(self.function, position)),
        }
    }

    /// Like [`Args::get`] but a missing or nil argument yields `None`.
    pub fn opt<T: Marshal>(&self, position: usize) -> Result<Option<T>, BindError> {
        match self.raw(position) {
            Value::Nil => Ok(None),
            _ => self.get(position).map(Some),
        }
    }

    /// A Lua string. Numbers are not coerced.
    pub fn string(&self, position: usize) -> Result<String, BindError> {
        match self.raw(position) {
            Value::String(s) => Ok(s.to_string_lossy()),
            other => Err(self.wrong_kind(position, "string", &other)),
        }
    }

    /// Raw bytes of a Lua string.
    pub fn bytes(&self, position: usize) -> Result<Vec<u8>, BindError> {
        match self.raw(position) {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(self.wrong_kind(position, "string", &other)),
        }
    }

    pub fn table(&self, position: usize) -> Result<Table, BindError> {
        match self.raw(position) {
            Value::Table(t) => Ok(t),
            other => Err(self.wrong_kind(position, "table", &other)),
        }
    }

    pub fn function_arg(&self, position: usize) -> Result<Function, BindError> {
        match self.raw(position) {
            Value::Function(f) => Ok(f),
            other => Err(self.wrong_kind(position, "function", &other)),
        }
    }

    /// A sequence decoded into a temporary buffer.
    pub fn array<T: Marshal>(&self, position: usize) -> Result<ScopedBuffer<T>, BindError> {
        let table = self.table(position)?;
        decode_array(&table).map_err(|e| e.at(self.function, position))
    }

    /// A raw pointer handed out earlier as light userdata.
    pub fn light(&self, position: usize) -> Result<*mut c_void, BindError> {
        match self.raw(position) {
            Value::LightUserData(ptr) => Ok(ptr.0),
            other => Err(self.wrong_kind(position, "light userdata", &other)),
        }
    }

    /// The userdata cell of a handle argument, checked against `T`.
    pub fn handle_cell<T: NativeResource>(&self, position: usize) -> Result<AnyUserData, BindError> {
        match self.raw(position) {
            Value::UserData(ud) => {
                // Resolve once so tag and release errors surface here.
                handle::with_handle(&ud, |_: &mut T| ()).map_err(|e| e.at(self.function, position))?;
                Ok(ud)
            }
            other => Err(self.wrong_kind(position, T::TAG.name(), &other)),
        }
    }

    /// Copy of the native struct embedded in a handle argument.
    pub fn handle<T: NativeResource>(&self, position: usize) -> Result<T, BindError> {
        let ud = self.handle_cell::<T>(position)?;
        handle::unwrap(&ud).map_err(|e| e.at(self.function, position))
    }
}

/// Register `f` as the global `name`, giving it positional argument access.
pub fn bind<R, F>(lua: &Lua, name: &'static str, f: F) -> LuaResult<()>
where
    R: IntoLuaMulti,
    F: Fn(&Lua, Args) -> LuaResult<R> + Send + 'static,
{
    let func = lua.create_function(move |lua, values: MultiValue| f(lua, Args::new(name, values)))?;
    lua.globals().set(name, func)
}
