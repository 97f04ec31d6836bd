/// `bindings/text.rs`: fonts, glyphs and UTF-8 helpers
use mlua::{Lua, Result as LuaResult};

use super::{bind_lib, bind_release, BindingEnv};
use crate::{
    error::BindError,
    marshal::{
        array::encode_array,
        handle::wrap,
        values::Color,
    },
    native::types::Font,
};

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "GetFontDefault", |lua, lib, _| wrap(lua, lib.get_font_default()))?;
    bind_lib(lua, env, "GetGlyphIndex", |_, lib, args| {
        let font: Font = args.handle(1)?;
        Ok(lib.get_glyph_index(&font, args.get(2)?))
    })?;
    bind_lib(lua, env, "GetGlyphInfo", |lua, lib, args| {
        let font: Font = args.handle(1)?;
        wrap(lua, lib.get_glyph_info(&font, args.get(2)?))
    })?;
    bind_lib(lua, env, "MeasureTextEx", |_, lib, args| {
        let font: Font = args.handle(1)?;
        Ok(lib.measure_text_ex(&font, &args.string(2)?, args.get(3)?, args.get(4)?))
    })?;
    bind_release::<Font>(lua, env, "UnloadFont")?;
    bind_lib(lua, env, "DrawText", |_, lib, args| {
        lib.draw_text(&args.string(1)?, args.get(2)?, args.get(3)?, args.get(4)?, args.get::<Color>(5)?);
        Ok(())
    })?;

    // Returns the codepoints and their count, like the C out-parameter.
    bind_lib(lua, env, "LoadCodepoints", |lua, lib, args| {
        let codepoints = lib.load_codepoints(&args.string(1)?);
        let count = codepoints.len;
        // SAFETY: `codepoints` holds `len` library-owned i32s until the unload below.
        let table = unsafe { encode_array(lua, codepoints.ptr, codepoints.len) };
        lib.unload_codepoints(codepoints);
        Ok((table?, count))
    })?;
    bind_lib(lua, env, "GetCodepointCount", |_, lib, args| Ok(lib.get_codepoint_count(&args.string(1)?)))?;
    bind_lib(lua, env, "LoadUTF8", |_, lib, args| {
        let codepoints = args.array::<i32>(1)?;
        let used = match args.opt::<i32>(2)? {
            Some(length) => (length.max(0) as usize).min(codepoints.len()),
            None => codepoints.len(),
        };
        Ok(lib.load_utf8(&codepoints.as_slice()[..used]))
    })?;
    bind_lib(lua, env, "TextSplit", |lua, lib, args| {
        let text = args.string(1)?;
        let delimiter = args.string(2)?.chars().next().ok_or(BindError::ArgumentType {
            function: "TextSplit",
            position: 2,
            expected: "character",
            got: "empty string".to_string(),
        })?;
        let parts = lib.text_split(&text, delimiter);
        let count = parts.len();
        Ok((lua.create_sequence_from(parts)?, count))
    })?;
    Ok(())
}
