/// `bindings/math.rs`: vector, matrix and color helpers
///
/// Pure functions; none of them touch the native library state.
use mlua::{Lua, Result as LuaResult};

use crate::{
    marshal::{args::bind, values::Color},
    native::math,
};

pub fn register(lua: &Lua) -> LuaResult<()> {
    register_vectors(lua)?;
    register_matrices(lua)?;
    register_colors(lua)?;
    Ok(())
}

fn register_vectors(lua: &Lua) -> LuaResult<()> {
    bind(lua, "Vector2Add", |_, a| Ok(math::vector2_add(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector2Subtract", |_, a| Ok(math::vector2_subtract(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector2Scale", |_, a| Ok(math::vector2_scale(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector2Length", |_, a| Ok(math::vector2_length(a.get(1)?)))?;
    bind(lua, "Vector2Normalize", |_, a| Ok(math::vector2_normalize(a.get(1)?)))?;
    bind(lua, "Vector2Distance", |_, a| Ok(math::vector2_distance(a.get(1)?, a.get(2)?)))?;

    bind(lua, "Vector3Add", |_, a| Ok(math::vector3_add(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector3Subtract", |_, a| Ok(math::vector3_subtract(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector3Scale", |_, a| Ok(math::vector3_scale(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector3CrossProduct", |_, a| Ok(math::vector3_cross_product(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector3DotProduct", |_, a| Ok(math::vector3_dot_product(a.get(1)?, a.get(2)?)))?;
    bind(lua, "Vector3Length", |_, a| Ok(math::vector3_length(a.get(1)?)))?;
    bind(lua, "Vector3Normalize", |_, a| Ok(math::vector3_normalize(a.get(1)?)))?;
    bind(lua, "Vector3Transform", |_, a| Ok(math::vector3_transform(a.get(1)?, a.get(2)?)))?;
    Ok(())
}

fn register_matrices(lua: &Lua) -> LuaResult<()> {
    bind(lua, "MatrixIdentity", |_, _| Ok(math::matrix_identity()))?;
    bind(lua, "MatrixMultiply", |_, a| Ok(math::matrix_multiply(a.get(1)?, a.get(2)?)))?;
    bind(lua, "MatrixTranslate", |_, a| Ok(math::matrix_translate(a.get(1)?, a.get(2)?, a.get(3)?)))?;
    bind(lua, "MatrixScale", |_, a| Ok(math::matrix_scale(a.get(1)?, a.get(2)?, a.get(3)?)))?;
    bind(lua, "MatrixRotateZ", |_, a| Ok(math::matrix_rotate_z(a.get(1)?)))?;
    bind(lua, "MatrixLookAt", |_, a| Ok(math::matrix_look_at(a.get(1)?, a.get(2)?, a.get(3)?)))?;
    Ok(())
}

fn register_colors(lua: &Lua) -> LuaResult<()> {
    bind(lua, "Fade", |_, a| Ok(math::fade(a.get(1)?, a.get(2)?)))?;
    // Same operation under its newer name.
    bind(lua, "ColorAlpha", |_, a| Ok(math::fade(a.get(1)?, a.get(2)?)))?;
    bind(lua, "ColorToInt", |_, a| Ok(math::color_to_int(a.get::<Color>(1)?)))?;
    bind(lua, "GetColor", |_, a| Ok(math::get_color(a.get(1)?)))?;
    bind(lua, "ColorFromHSV", |_, a| Ok(math::color_from_hsv(a.get(1)?, a.get(2)?, a.get(3)?)))?;
    bind(lua, "ColorToHSV", |_, a| Ok(math::color_to_hsv(a.get(1)?)))?;
    Ok(())
}
