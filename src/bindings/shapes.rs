/// `bindings/shapes.rs`: basic shapes and 2D collision checks
use mlua::{Lua, Result as LuaResult};

use super::{bind_lib, BindingEnv};
use crate::{
    error::BindError,
    marshal::{
        args::{bind, Args},
        array::ScopedBuffer,
        values::{Color, Rectangle, Vector2},
    },
    native::math,
};

/// A point array, optionally followed by an explicit count as in the C
/// signature (`points, count, ...`). Returns the points in use and the
/// position of the next argument.
fn points_arg(args: &Args, position: usize) -> Result<(ScopedBuffer<Vector2>, usize, usize), BindError> {
    let points = args.array::<Vector2>(position)?;
    if args.len() > position + 1 {
        let count: i32 = args.get(position + 1)?;
        let used = (count.max(0) as usize).min(points.len());
        return Ok((points, used, position + 2));
    }
    let used = points.len();
    Ok((points, used, position + 1))
}

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "DrawRectangleRec", |_, lib, args| {
        lib.draw_rectangle_rec(args.get::<Rectangle>(1)?, args.get::<Color>(2)?);
        Ok(())
    })?;
    bind_lib(lua, env, "DrawLineStrip", |_, lib, args| {
        let (points, used, next) = points_arg(&args, 1)?;
        lib.draw_line_strip(&points.as_slice()[..used], args.get::<Color>(next)?);
        Ok(())
    })?;
    bind_lib(lua, env, "DrawTriangleFan", |_, lib, args| {
        let (points, used, next) = points_arg(&args, 1)?;
        lib.draw_triangle_fan(&points.as_slice()[..used], args.get::<Color>(next)?);
        Ok(())
    })?;

    bind(lua, "CheckCollisionRecs", |_, args| {
        Ok(math::check_collision_recs(args.get(1)?, args.get(2)?))
    })?;
    bind(lua, "GetCollisionRec", |_, args| Ok(math::get_collision_rec(args.get(1)?, args.get(2)?)))?;
    bind(lua, "CheckCollisionPointRec", |_, args| {
        Ok(math::check_collision_point_rec(args.get(1)?, args.get(2)?))
    })?;
    bind(lua, "CheckCollisionCircles", |_, args| {
        Ok(math::check_collision_circles(args.get(1)?, args.get(2)?, args.get(3)?, args.get(4)?))
    })?;
    bind(lua, "CheckCollisionPointPoly", |_, args| {
        let point: Vector2 = args.get(1)?;
        let points = args.array::<Vector2>(2)?;
        let used = match args.opt::<i32>(3)? {
            Some(count) => (count.max(0) as usize).min(points.len()),
            None => points.len(),
        };
        Ok(math::check_collision_point_poly(point, &points.as_slice()[..used]))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{error_of, lua_with_api};
    use crate::{
        marshal::values::{Color, Vector2},
        native::DrawCommand,
    };

    #[test]
    fn line_strip_decodes_the_point_array() {
        let (lua, env) = lua_with_api();
        lua.load(
            r#"
            DrawLineStrip({ {x = 0, y = 0}, {x = 1, y = 2}, {x = 3, y = 4} }, RED)
            DrawTriangleFan({ {x = 0, y = 0}, {x = 1, y = 0}, {x = 1, y = 1}, {x = 0, y = 1} }, 3, BLUE)
            "#,
        )
        .exec()
        .unwrap();
        let frame = env.library.pending_frame();
        assert_eq!(
            frame[0],
            DrawCommand::LineStrip {
                points: vec![Vector2::new(0.0, 0.0), Vector2::new(1.0, 2.0), Vector2::new(3.0, 4.0)],
                color: Color::RED
            }
        );
        match &frame[1] {
            DrawCommand::TriangleFan { points, color } => {
                assert_eq!(points.len(), 3);
                assert_eq!(*color, Color::BLUE);
            }
            other => panic!("unexpected {other:?}"),
        }
        env.trampoline.unbind();
    }

    #[test]
    fn bad_point_names_the_element_and_draws_nothing() {
        let (lua, env) = lua_with_api();
        let msg = error_of(&lua, "DrawLineStrip({ {x = 0, y = 0}, {x = 1} }, RED)");
        assert!(msg.contains("bad argument #1 to 'DrawLineStrip'"), "{msg}");
        assert!(msg.contains("[2].y"), "{msg}");
        assert!(env.library.pending_frame().is_empty());
        env.trampoline.unbind();
    }

    #[test]
    fn collision_helpers() {
        let (lua, env) = lua_with_api();
        let (recs, point, circles, poly, w): (bool, bool, bool, bool, f32) = lua
            .load(
                r#"
                local a = { x = 0, y = 0, width = 10, height = 10 }
                local b = { x = 5, y = 5, width = 10, height = 10 }
                local square = { {x = 0, y = 0}, {x = 4, y = 0}, {x = 4, y = 4}, {x = 0, y = 4} }
                return CheckCollisionRecs(a, b),
                    CheckCollisionPointRec({ x = 20, y = 1 }, a),
                    CheckCollisionCircles({ x = 0, y = 0 }, 1, { x = 1.5, y = 0 }, 1),
                    CheckCollisionPointPoly({ x = 2, y = 2 }, square),
                    GetCollisionRec(a, b).width
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!((recs, point, circles, poly, w), (true, false, true, true, 5.0));
        env.trampoline.unbind();
    }
}
