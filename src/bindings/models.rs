/// `bindings/models.rs`: meshes, materials, models, animations and cameras
use mlua::{Lua, Result as LuaResult};

use super::{bind_lib, bind_release, BindingEnv};
use crate::{
    marshal::{
        args::bind,
        handle::wrap,
        values::{Camera2D, Camera3D},
    },
    native::{
        math,
        types::{Material, Mesh, Model, ModelAnimation},
    },
};

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    register_meshes(lua, env)?;
    register_models(lua, env)?;
    register_collisions(lua)?;
    register_cameras(lua)?;
    Ok(())
}

fn register_meshes(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "GenMeshCube", |lua, lib, args| {
        wrap(lua, lib.gen_mesh_cube(args.get(1)?, args.get(2)?, args.get(3)?))
    })?;
    bind_lib(lua, env, "GenMeshPlane", |lua, lib, args| {
        wrap(lua, lib.gen_mesh_plane(args.get(1)?, args.get(2)?, args.get(3)?, args.get(4)?))
    })?;
    bind_lib(lua, env, "GetMeshBoundingBox", |_, lib, args| {
        let mesh: Mesh = args.handle(1)?;
        Ok(lib.get_mesh_bounding_box(&mesh))
    })?;
    bind_release::<Mesh>(lua, env, "UnloadMesh")?;

    bind_lib(lua, env, "LoadMaterialDefault", |lua, lib, _| wrap(lua, lib.load_material_default()))?;
    bind_release::<Material>(lua, env, "UnloadMaterial")?;
    Ok(())
}

fn register_models(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    // The mesh now belongs to the model; unloading both is a double free.
    bind_lib(lua, env, "LoadModelFromMesh", |lua, lib, args| {
        let mesh: Mesh = args.handle(1)?;
        wrap(lua, lib.load_model_from_mesh(mesh))
    })?;
    bind_lib(lua, env, "GetModelBoundingBox", |_, lib, args| {
        let model: Model = args.handle(1)?;
        Ok(lib.get_model_bounding_box(&model))
    })?;
    bind_release::<Model>(lua, env, "UnloadModel")?;

    // Copy-out: each element becomes its own handle, the array is freed.
    bind_lib(lua, env, "LoadModelAnimations", |lua, lib, args| {
        let animations = lib.load_model_animations(&args.string(1)?);
        let count = animations.len;
        let handles = (0..count)
            .map(|i| {
                // SAFETY: `animations` holds `len` library-owned elements until
                // the unload below, and i < len.
                let anim: ModelAnimation = unsafe { *animations.ptr.add(i) };
                wrap(lua, anim)
            })
            .collect::<LuaResult<Vec<_>>>();
        lib.unload_model_animations(animations);
        Ok((lua.create_sequence_from(handles?)?, count))
    })?;
    bind_release::<ModelAnimation>(lua, env, "UnloadModelAnimation")?;
    Ok(())
}

fn register_collisions(lua: &Lua) -> LuaResult<()> {
    bind(lua, "CheckCollisionBoxes", |_, a| Ok(math::check_collision_boxes(a.get(1)?, a.get(2)?)))?;
    bind(lua, "GetRayCollisionBox", |_, a| Ok(math::get_ray_collision_box(a.get(1)?, a.get(2)?)))?;
    bind(lua, "GetRayCollisionSphere", |_, a| {
        Ok(math::get_ray_collision_sphere(a.get(1)?, a.get(2)?, a.get(3)?))
    })?;
    Ok(())
}

/// Cameras are built from a table once and passed around as handles.
fn register_cameras(lua: &Lua) -> LuaResult<()> {
    bind(lua, "Camera2D", |lua, a| wrap(lua, a.get::<Camera2D>(1)?))?;
    bind(lua, "Camera3D", |lua, a| wrap(lua, a.get::<Camera3D>(1)?))?;
    bind(lua, "GetCameraMatrix", |_, a| {
        let camera: Camera3D = a.handle(1)?;
        Ok(math::get_camera_matrix(&camera))
    })?;
    bind(lua, "GetCameraMatrix2D", |_, a| {
        let camera: Camera2D = a.handle(1)?;
        Ok(math::get_camera_matrix_2d(&camera))
    })?;
    bind(lua, "GetWorldToScreen2D", |_, a| {
        let camera: Camera2D = a.handle(2)?;
        Ok(math::get_world_to_screen_2d(a.get(1)?, &camera))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{error_of, lua_with_api};
    use crate::marshal::values::{BoundingBox, RayCollision, Vector2, Vector3};

    #[test]
    fn model_from_cube_mesh() {
        let (lua, env) = lua_with_api();
        let (mesh_box, model_box): (BoundingBox, BoundingBox) = lua
            .load(
                r#"
                local mesh = GenMeshCube(2, 2, 2)
                local mesh_box = GetMeshBoundingBox(mesh)
                local model = LoadModelFromMesh(mesh)
                local model_box = GetModelBoundingBox(model)
                UnloadModel(model)
                return mesh_box, model_box
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(mesh_box.max, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(model_box, mesh_box);
        assert_eq!(env.library.live_buffers(), 0);
        env.trampoline.unbind();
    }

    #[test]
    fn released_handles_are_caught_in_debug_builds() {
        let (lua, env) = lua_with_api();
        let msg = error_of(
            &lua,
            r#"
            local mat = LoadMaterialDefault()
            UnloadMaterial(mat)
            UnloadMaterial(mat)
            "#,
        );
        if cfg!(debug_assertions) {
            assert!(msg.contains("use of Material handle after release"), "{msg}");
        }
        env.trampoline.unbind();
    }

    #[test]
    fn ray_hits_box() {
        let (lua, env) = lua_with_api();
        let hit: RayCollision = lua
            .load(
                r#"
                local ray = { position = { x = 0, y = 0, z = -5 }, direction = { x = 0, y = 0, z = 1 } }
                local box = { min = { x = -1, y = -1, z = -1 }, max = { x = 1, y = 1, z = 1 } }
                return GetRayCollisionBox(ray, box)
                "#,
            )
            .eval()
            .unwrap();
        assert!(hit.hit);
        assert_eq!(hit.distance, 4.0);
        assert_eq!(hit.normal, Vector3::new(0.0, 0.0, -1.0));
        env.trampoline.unbind();
    }

    #[test]
    fn camera_handles() {
        let (lua, env) = lua_with_api();
        let screen: Vector2 = lua
            .load(
                r#"
                local cam = Camera2D({ offset = { x = 100, y = 50 }, target = { x = 0, y = 0 },
                    rotation = 0, zoom = 2 })
                assert(cam.tag == "Camera2D")
                return GetWorldToScreen2D({ x = 10, y = 5 }, cam)
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(screen, Vector2::new(120.0, 60.0));

        let msg = error_of(&lua, "Camera3D({ position = { x = 0, y = 0 } })");
        assert!(msg.contains("position.z"), "{msg}");
        env.trampoline.unbind();
    }
}
