/// `marshal/values.rs`: plain-value shapes and their table conversions
///
/// Each shape is a `#[repr(C)]` record with the native field layout. On the
/// Lua side it is a table keyed by field name. Decoding is all-or-nothing:
/// the first missing or mistyped field aborts with `SchemaMismatch`.
use mlua::{FromLua, IntoLua, Lua, Result as LuaResult, Table, Value};

use crate::error::BindError;

// ── Single values ─────────────────────────────────────────────────────────────

/// Anything that crosses the boundary as one Lua value: scalars, plain
/// shapes, and elements of marshalled arrays.
pub trait Marshal: Sized {
    /// Kind name used in mismatch messages.
    const EXPECTED: &'static str;

    /// Decode `value`. `path` names the field or element being read and is
    /// reported verbatim on failure.
    fn from_lua_value(value: Value, path: &str) -> Result<Self, BindError>;

    /// Encoding never fails for valid native values; the `LuaResult` only
    /// carries allocation errors from the VM.
    fn to_lua_value(&self, lua: &Lua) -> LuaResult<Value>;
}

pub(crate) fn mismatch<T: Marshal>(path: &str) -> BindError {
    BindError::SchemaMismatch { field: path.to_string(), expected: T::EXPECTED }
}

impl Marshal for f32 {
    const EXPECTED: &'static str = "number";

    fn from_lua_value(value: Value, path: &str) -> Result<Self, BindError> {
        match value {
            Value::Integer(i) => Ok(i as f32),
            Value::Number(n) => Ok(n as f32),
            _ => Err(mismatch::<Self>(path)),
        }
    }

    fn to_lua_value(&self, _lua: &Lua) -> LuaResult<Value> {
        Ok(Value::Number(f64::from(*self)))
    }
}

impl Marshal for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_lua_value(value: Value, path: &str) -> Result<Self, BindError> {
        match value {
            Value::Boolean(b) => Ok(b),
            _ => Err(mismatch::<Self>(path)),
        }
    }

    fn to_lua_value(&self, _lua: &Lua) -> LuaResult<Value> {
        Ok(Value::Boolean(*self))
    }
}

/// Integral floats (`3.0`) are accepted, fractional ones and anything out of
/// range for the target type are rejected.
pub(crate) fn integral(value: &Value) -> Option<i64> {
    match *value {
        Value::Integer(i) => Some(i),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => {
            if n >= i64::MIN as f64 && n <= i64::MAX as f64 {
                Some(n as i64)
            } else {
                None
            }
        }
        _ => None,
    }
}

macro_rules! integer_marshal {
    ($($ty:ty => $expected:literal),+ $(,)?) => {$(
        impl Marshal for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_lua_value(value: Value, path: &str) -> Result<Self, BindError> {
                integral(&value)
                    .and_then(|i| <$ty>::try_from(i).ok())
                    .ok_or_else(|| mismatch::<Self>(path))
            }

            fn to_lua_value(&self, _lua: &Lua) -> LuaResult<Value> {
                Ok(Value::Integer(i64::from(*self)))
            }
        }
    )+};
}

integer_marshal! {
    u8 => "integer (0-255)",
    u16 => "integer (0-65535)",
    i32 => "integer",
    u32 => "non-negative integer",
}

// ── Plain shapes ──────────────────────────────────────────────────────────────

/// A fixed-shape numeric aggregate with a keyed-table representation.
pub trait PlainValue: Marshal + Copy {
    const NAME: &'static str;

    /// Decode a table whose fields are reported relative to `path`.
    fn decode_at(table: &Table, path: &str) -> Result<Self, BindError>;

    fn encode(&self, lua: &Lua) -> LuaResult<Table>;

    fn decode(table: &Table) -> Result<Self, BindError> {
        Self::decode_at(table, "")
    }
}

pub(crate) fn qualify(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn read_field<T: Marshal>(table: &Table, path: &str, field: &str) -> Result<T, BindError> {
    let full = qualify(path, field);
    let value: Value = table.get(field).map_err(|_| mismatch::<T>(&full))?;
    T::from_lua_value(value, &full)
}

macro_rules! plain_value {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            $(pub $field: $ty),+
        }

        impl PlainValue for $name {
            const NAME: &'static str = stringify!($name);

            fn decode_at(table: &Table, path: &str) -> Result<Self, BindError> {
                Ok(Self {
                    $($field: read_field(table, path, stringify!($field))?),+
                })
            }

            fn encode(&self, lua: &Lua) -> LuaResult<Table> {
                let t = lua.create_table()?;
                $(t.raw_set(stringify!($field), self.$field.to_lua_value(lua)?)?;)+
                Ok(t)
            }
        }

        impl Marshal for $name {
            const EXPECTED: &'static str = concat!(stringify!($name), " table");

            fn from_lua_value(value: Value, path: &str) -> Result<Self, BindError> {
                match value {
                    Value::Table(t) => Self::decode_at(&t, path),
                    _ => Err(mismatch::<Self>(path)),
                }
            }

            fn to_lua_value(&self, lua: &Lua) -> LuaResult<Value> {
                self.encode(lua).map(Value::Table)
            }
        }

        impl FromLua for $name {
            fn from_lua(value: Value, _lua: &Lua) -> LuaResult<Self> {
                Self::from_lua_value(value, "").map_err(mlua::Error::external)
            }
        }

        impl IntoLua for $name {
            fn into_lua(self, lua: &Lua) -> LuaResult<Value> {
                self.encode(lua).map(Value::Table)
            }
        }
    };
}

plain_value!(Vector2 { x: f32, y: f32 });
plain_value!(Vector3 { x: f32, y: f32, z: f32 });
plain_value!(
    /// Also used for quaternions.
    Vector4 { x: f32, y: f32, z: f32, w: f32 }
);
plain_value!(
    /// RGBA, 8 bits per channel.
    Color { r: u8, g: u8, b: u8, a: u8 }
);
plain_value!(Rectangle { x: f32, y: f32, width: f32, height: f32 });
plain_value!(
    /// 4x4 float matrix. Field order is the native memory order
    /// (column major); field names carry the logical index.
    Matrix {
        m0: f32, m4: f32, m8: f32, m12: f32,
        m1: f32, m5: f32, m9: f32, m13: f32,
        m2: f32, m6: f32, m10: f32, m14: f32,
        m3: f32, m7: f32, m11: f32, m15: f32,
    }
);
plain_value!(Ray { position: Vector3, direction: Vector3 });
plain_value!(BoundingBox { min: Vector3, max: Vector3 });
plain_value!(
    /// Nine-patch / three-patch layout description for a texture region.
    NPatchInfo { source: Rectangle, left: i32, top: i32, right: i32, bottom: i32, layout: i32 }
);
plain_value!(RayCollision { hit: bool, distance: f32, point: Vector3, normal: Vector3 });
plain_value!(Camera2D { offset: Vector2, target: Vector2, rotation: f32, zoom: f32 });
plain_value!(Camera3D { position: Vector3, target: Vector3, up: Vector3, fovy: f32, projection: i32 });

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Rectangle {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const LIGHTGRAY: Color = Color::new(200, 200, 200, 255);
    pub const GRAY: Color = Color::new(130, 130, 130, 255);
    pub const DARKGRAY: Color = Color::new(80, 80, 80, 255);
    pub const YELLOW: Color = Color::new(253, 249, 0, 255);
    pub const GOLD: Color = Color::new(255, 203, 0, 255);
    pub const ORANGE: Color = Color::new(255, 161, 0, 255);
    pub const PINK: Color = Color::new(255, 109, 194, 255);
    pub const RED: Color = Color::new(230, 41, 55, 255);
    pub const MAROON: Color = Color::new(190, 33, 55, 255);
    pub const GREEN: Color = Color::new(0, 228, 48, 255);
    pub const LIME: Color = Color::new(0, 158, 47, 255);
    pub const DARKGREEN: Color = Color::new(0, 117, 44, 255);
    pub const SKYBLUE: Color = Color::new(102, 191, 255, 255);
    pub const BLUE: Color = Color::new(0, 121, 241, 255);
    pub const DARKBLUE: Color = Color::new(0, 82, 172, 255);
    pub const PURPLE: Color = Color::new(200, 122, 255, 255);
    pub const VIOLET: Color = Color::new(135, 60, 190, 255);
    pub const BEIGE: Color = Color::new(211, 176, 131, 255);
    pub const BROWN: Color = Color::new(127, 106, 79, 255);
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const BLANK: Color = Color::new(0, 0, 0, 0);
    pub const MAGENTA: Color = Color::new(255, 0, 255, 255);
    pub const RAYWHITE: Color = Color::new(245, 245, 245, 255);

    /// Named palette exported to scripts as global tables.
    pub const PALETTE: [(&'static str, Color); 24] = [
        ("LIGHTGRAY", Self::LIGHTGRAY),
        ("GRAY", Self::GRAY),
        ("DARKGRAY", Self::DARKGRAY),
        ("YELLOW", Self::YELLOW),
        ("GOLD", Self::GOLD),
        ("ORANGE", Self::ORANGE),
        ("PINK", Self::PINK),
        ("RED", Self::RED),
        ("MAROON", Self::MAROON),
        ("GREEN", Self::GREEN),
        ("LIME", Self::LIME),
        ("DARKGREEN", Self::DARKGREEN),
        ("SKYBLUE", Self::SKYBLUE),
        ("BLUE", Self::BLUE),
        ("DARKBLUE", Self::DARKBLUE),
        ("PURPLE", Self::PURPLE),
        ("VIOLET", Self::VIOLET),
        ("BEIGE", Self::BEIGE),
        ("BROWN", Self::BROWN),
        ("WHITE", Self::WHITE),
        ("BLACK", Self::BLACK),
        ("BLANK", Self::BLANK),
        ("MAGENTA", Self::MAGENTA),
        ("RAYWHITE", Self::RAYWHITE),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: PlainValue + PartialEq + std::fmt::Debug>(lua: &Lua, value: T) {
        let table = value.encode(lua).unwrap();
        assert_eq!(T::decode(&table).unwrap(), value, "{} round trip", T::NAME);
    }

    #[test]
    fn shapes_round_trip_exactly() {
        let lua = Lua::new();
        round_trip(&lua, Vector2::new(1.5, -0.1));
        round_trip(&lua, Vector4 { x: 0.1, y: 0.2, z: 0.3, w: 1.0 });
        round_trip(&lua, Rectangle::new(0.25, 8.0, 1e-7, f32::MAX));
        round_trip(&lua, Matrix { m0: 1.0, m5: 1.0, m10: 1.0, m12: 3.3, m15: 1.0, ..Default::default() });
        round_trip(&lua, Ray { position: Vector3::new(0.0, 1.0, 2.0), direction: Vector3::new(0.0, 0.0, -1.0) });
        round_trip(&lua, NPatchInfo {
            source: Rectangle::new(0.0, 0.0, 64.0, 64.0),
            left: 4,
            top: 4,
            right: -4,
            bottom: 4,
            layout: 2,
        });
        round_trip(&lua, Camera3D {
            position: Vector3::new(10.0, 10.0, 10.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fovy: 45.0,
            ..Default::default()
        });
    }

    #[test]
    fn red_color_survives_the_boundary() {
        let lua = Lua::new();
        let red: Table = lua.load("return { r = 255, g = 0, b = 0, a = 255 }").eval().unwrap();
        let color = Color::decode(&red).unwrap();
        assert_eq!(color, Color::new(255, 0, 0, 255));

        let back = color.encode(&lua).unwrap();
        assert_eq!(back.get::<i64>("r").unwrap(), 255);
        assert_eq!(back.get::<i64>("g").unwrap(), 0);
        assert_eq!(back.get::<i64>("b").unwrap(), 0);
        assert_eq!(back.get::<i64>("a").unwrap(), 255);
    }

    #[test]
    fn missing_field_is_named() {
        let lua = Lua::new();
        let t: Table = lua.load("return { x = 1, y = 2, width = 3 }").eval().unwrap();
        assert_eq!(
            Rectangle::decode(&t),
            Err(BindError::SchemaMismatch { field: "height".into(), expected: "number" })
        );
    }

    #[test]
    fn nested_missing_field_uses_dotted_path() {
        let lua = Lua::new();
        let t: Table = lua
            .load("return { position = { x = 0, y = 0 }, direction = { x = 0, y = 0, z = 1 } }")
            .eval()
            .unwrap();
        match Ray::decode(&t) {
            Err(BindError::SchemaMismatch { field, .. }) => assert_eq!(field, "position.z"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn integer_fields_reject_fractions_and_range() {
        let lua = Lua::new();
        let frac: Table = lua.load("return { r = 1.5, g = 0, b = 0, a = 0 }").eval().unwrap();
        assert!(matches!(Color::decode(&frac), Err(BindError::SchemaMismatch { field, .. }) if field == "r"));

        let wide: Table = lua.load("return { r = 0, g = 256, b = 0, a = 0 }").eval().unwrap();
        assert!(matches!(Color::decode(&wide), Err(BindError::SchemaMismatch { field, .. }) if field == "g"));

        let whole: Table = lua.load("return { r = 10.0, g = 0, b = 0, a = 0 }").eval().unwrap();
        assert_eq!(Color::decode(&whole).unwrap().r, 10);
    }

    #[test]
    fn float_fields_accept_integers_but_not_strings() {
        let lua = Lua::new();
        let ints: Table = lua.load("return { x = 3, y = -4 }").eval().unwrap();
        assert_eq!(Vector2::decode(&ints).unwrap(), Vector2::new(3.0, -4.0));

        let text: Table = lua.load("return { x = '3', y = 0 }").eval().unwrap();
        assert!(Vector2::decode(&text).is_err());
    }

    #[test]
    fn ray_collision_encodes_hit_flag() {
        let lua = Lua::new();
        let hit = RayCollision { hit: true, distance: 2.0, ..Default::default() };
        let t = hit.encode(&lua).unwrap();
        assert!(t.get::<bool>("hit").unwrap());
        assert_eq!(t.get::<Table>("point").unwrap().get::<f32>("x").unwrap(), 0.0);
    }
}
