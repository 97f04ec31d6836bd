/// `bindings/textures.rs`: images, textures and render targets
use mlua::{Lua, Result as LuaResult};

use super::{bind_lib, bind_release, BindingEnv};
use crate::{
    marshal::{
        array::encode_array,
        handle::{self, wrap},
        values::{Color, NPatchInfo, Rectangle, Vector2},
    },
    native::types::{Cubemap, Image, RenderTexture, Texture},
};

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    register_images(lua, env)?;
    register_textures(lua, env)?;
    Ok(())
}

fn register_images(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "GenImageColor", |lua, lib, args| {
        wrap(lua, lib.gen_image_color(args.get(1)?, args.get(2)?, args.get(3)?))
    })?;
    bind_lib(lua, env, "GenImageChecked", |lua, lib, args| {
        let image = lib.gen_image_checked(
            args.get(1)?,
            args.get(2)?,
            args.get(3)?,
            args.get(4)?,
            args.get(5)?,
            args.get(6)?,
        );
        wrap(lua, image)
    })?;
    bind_lib(lua, env, "ImageCopy", |lua, lib, args| {
        let image: Image = args.handle(1)?;
        wrap(lua, lib.image_copy(&image))
    })?;
    bind_lib(lua, env, "IsImageValid", |_, lib, args| Ok(lib.is_image_valid(&args.handle(1)?)))?;
    bind_release::<Image>(lua, env, "UnloadImage")?;

    // In/out calls edit the struct inside the caller's handle.
    bind_lib(lua, env, "ImageResize", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        let (w, h) = (args.get(2)?, args.get(3)?);
        handle::with_handle(&cell, |image: &mut Image| lib.image_resize(image, w, h))?;
        Ok(())
    })?;
    bind_lib(lua, env, "ImageResizeNN", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        let (w, h) = (args.get(2)?, args.get(3)?);
        handle::with_handle(&cell, |image: &mut Image| lib.image_resize_nn(image, w, h))?;
        Ok(())
    })?;
    bind_lib(lua, env, "ImageCrop", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        let crop: Rectangle = args.get(2)?;
        handle::with_handle(&cell, |image: &mut Image| lib.image_crop(image, crop))?;
        Ok(())
    })?;
    bind_lib(lua, env, "ImageFlipVertical", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        handle::with_handle(&cell, |image: &mut Image| lib.image_flip_vertical(image))?;
        Ok(())
    })?;
    bind_lib(lua, env, "ImageDrawPixel", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        let (x, y, color) = (args.get(2)?, args.get(3)?, args.get::<Color>(4)?);
        handle::with_handle(&cell, |image: &mut Image| lib.image_draw_pixel(image, x, y, color))?;
        Ok(())
    })?;
    bind_lib(lua, env, "ImageDrawRectangleRec", |_, lib, args| {
        let cell = args.handle_cell::<Image>(1)?;
        let (rec, color) = (args.get::<Rectangle>(2)?, args.get::<Color>(3)?);
        handle::with_handle(&cell, |image: &mut Image| lib.image_draw_rectangle_rec(image, rec, color))?;
        Ok(())
    })?;

    bind_lib(lua, env, "GetImageColor", |_, lib, args| {
        let image: Image = args.handle(1)?;
        Ok(lib.get_image_color(&image, args.get(2)?, args.get(3)?))
    })?;
    // Copy-out: the native array is released before returning.
    bind_lib(lua, env, "LoadImageColors", |lua, lib, args| {
        let image: Image = args.handle(1)?;
        let colors = lib.load_image_colors(&image);
        // SAFETY: `colors` holds `len` library-owned Colors until the unload below.
        let table = unsafe { encode_array(lua, colors.ptr, colors.len) };
        lib.unload_image_colors(colors);
        table
    })?;
    Ok(())
}

fn register_textures(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "LoadTextureFromImage", |lua, lib, args| {
        let image: Image = args.handle(1)?;
        wrap(lua, lib.load_texture_from_image(&image))
    })?;
    bind_lib(lua, env, "LoadTextureCubemap", |lua, lib, args| {
        let image: Image = args.handle(1)?;
        wrap(lua, lib.load_texture_cubemap(&image, args.get(2)?))
    })?;
    bind_lib(lua, env, "LoadRenderTexture", |lua, lib, args| {
        wrap(lua, lib.load_render_texture(args.get(1)?, args.get(2)?))
    })?;
    bind_lib(lua, env, "IsTextureValid", |_, lib, args| Ok(lib.is_texture_valid(&args.handle(1)?)))?;
    bind_release::<Texture>(lua, env, "UnloadTexture")?;
    bind_release::<Cubemap>(lua, env, "UnloadCubemap")?;
    bind_release::<RenderTexture>(lua, env, "UnloadRenderTexture")?;

    bind_lib(lua, env, "DrawTexture", |_, lib, args| {
        let texture: Texture = args.handle(1)?;
        lib.draw_texture(&texture, args.get(2)?, args.get(3)?, args.get(4)?);
        Ok(())
    })?;
    bind_lib(lua, env, "DrawTextureNPatch", |_, lib, args| {
        let texture: Texture = args.handle(1)?;
        let info: NPatchInfo = args.get(2)?;
        let dest: Rectangle = args.get(3)?;
        let origin: Vector2 = args.get(4)?;
        lib.draw_texture_npatch(&texture, info, dest, origin, args.get(5)?, args.get(6)?);
        Ok(())
    })?;
    Ok(())
}
