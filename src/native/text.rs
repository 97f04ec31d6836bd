/// `native/text.rs`: default font, glyph lookup and codepoint helpers
use super::{
    lock,
    types::{Font, GlyphInfo, RawBuffer, Texture, PIXELFORMAT_UNCOMPRESSED_R8G8B8A8},
    DrawCommand, NativeLibrary,
};
use crate::marshal::values::{Color, Rectangle, Vector2};

const DEFAULT_BASE_SIZE: i32 = 10;
const DEFAULT_FIRST_CHAR: i32 = 32;
const DEFAULT_GLYPH_COUNT: i32 = 95;
const DEFAULT_GLYPH_WIDTH: f32 = 5.0;
const TEXT_LINE_SPACING: f32 = 2.0;
const MAX_TEXT_SPLIT: usize = 128;

/// The lazily built default font, kept so `unload_font` can refuse it.
pub(crate) struct DefaultFont(Font);

// SAFETY: the pointers in the wrapped Font are ledger keys owned by the same
// NativeLibrary; they are only followed under the ledger lock.
unsafe impl Send for DefaultFont {}

impl NativeLibrary {
    /// The built-in font. Built on first use, never unloaded.
    pub fn get_font_default(&self) -> Font {
        let mut slot = lock(&self.default_font);
        if let Some(DefaultFont(font)) = slot.as_ref() {
            return *font;
        }

        let mut recs = Vec::with_capacity(DEFAULT_GLYPH_COUNT as usize);
        let mut glyphs = Vec::with_capacity(DEFAULT_GLYPH_COUNT as usize);
        for i in 0..DEFAULT_GLYPH_COUNT {
            let (col, row) = (i % 16, i / 16);
            recs.push(Rectangle::new(
                1.0 + col as f32 * (DEFAULT_GLYPH_WIDTH + 2.0),
                1.0 + row as f32 * (DEFAULT_BASE_SIZE as f32 + 2.0),
                DEFAULT_GLYPH_WIDTH,
                DEFAULT_BASE_SIZE as f32,
            ));
            glyphs.push(GlyphInfo { value: DEFAULT_FIRST_CHAR + i, ..Default::default() });
        }

        let id = self.alloc_texture_id();
        let font = {
            let mut ledger = self.ledger();
            Font {
                base_size: DEFAULT_BASE_SIZE,
                glyph_count: DEFAULT_GLYPH_COUNT,
                glyph_padding: 0,
                texture: Texture { id, width: 128, height: 128, mipmaps: 1, format: PIXELFORMAT_UNCOMPRESSED_R8G8B8A8 },
                recs: ledger.insert(recs),
                glyphs: ledger.insert(glyphs),
            }
        };
        log::info!("FONT: Default font loaded successfully ({DEFAULT_GLYPH_COUNT} glyphs)");
        *slot = Some(DefaultFont(font));
        font
    }

    fn is_default_font(&self, font: &Font) -> bool {
        lock(&self.default_font).as_ref().is_some_and(|d| d.0.glyphs == font.glyphs)
    }

    pub fn unload_font(&self, font: Font) {
        if self.is_default_font(&font) {
            log::debug!("FONT: Default font is not unloaded");
            return;
        }
        {
            let mut ledger = self.ledger();
            ledger.take(font.recs as *const Rectangle);
            ledger.take(font.glyphs as *const GlyphInfo);
        }
        if font.texture.id != 0 {
            self.free_texture_id(font.texture.id);
        }
        log::debug!("FONT: Unloaded font data from RAM and VRAM");
    }

    /// Index of `codepoint` in the font, falling back to '?' and then 0.
    pub fn get_glyph_index(&self, font: &Font, codepoint: i32) -> i32 {
        self.ledger()
            .with(font.glyphs as *const GlyphInfo, |glyphs| {
                let find = |cp: i32| glyphs.iter().position(|g| g.value == cp);
                find(codepoint).or_else(|| find('?' as i32)).unwrap_or(0) as i32
            })
            .unwrap_or(0)
    }

    pub fn get_glyph_info(&self, font: &Font, codepoint: i32) -> GlyphInfo {
        let index = self.get_glyph_index(font, codepoint) as usize;
        self.ledger()
            .with(font.glyphs as *const GlyphInfo, |glyphs| glyphs.get(index).copied())
            .flatten()
            .unwrap_or_default()
    }

    pub fn measure_text_ex(&self, font: &Font, text: &str, font_size: f32, spacing: f32) -> Vector2 {
        if text.is_empty() || font.base_size <= 0 {
            return Vector2::default();
        }
        let (glyphs, recs) = {
            let mut ledger = self.ledger();
            (
                ledger.with(font.glyphs as *const GlyphInfo, |g| g.to_vec()).unwrap_or_default(),
                ledger.with(font.recs as *const Rectangle, |r| r.to_vec()).unwrap_or_default(),
            )
        };
        let find = |cp: i32| glyphs.iter().position(|g| g.value == cp);
        let glyph_width = |c: char| {
            let index = find(c as i32).or_else(|| find('?' as i32)).unwrap_or(0);
            let glyph = glyphs.get(index).copied().unwrap_or_default();
            if glyph.advance_x > 0 {
                glyph.advance_x as f32
            } else {
                recs.get(index).map_or(0.0, |r| r.width) + glyph.offset_x as f32
            }
        };

        let mut text_width = 0.0f32;
        let mut widest = 0.0f32;
        let mut text_height = font_size;
        let mut line_len = 0usize;
        let mut longest_line = 0usize;
        for c in text.chars() {
            line_len += 1;
            if c == '\n' {
                widest = widest.max(text_width);
                line_len = 0;
                text_width = 0.0;
                text_height += font_size + TEXT_LINE_SPACING;
            } else {
                text_width += glyph_width(c);
            }
            longest_line = longest_line.max(line_len);
        }
        widest = widest.max(text_width);

        let scale = font_size / font.base_size as f32;
        Vector2::new(widest * scale + longest_line.saturating_sub(1) as f32 * spacing, text_height)
    }

    pub fn draw_text(&self, text: &str, x: i32, y: i32, font_size: i32, color: Color) {
        self.record(DrawCommand::Text { text: text.to_string(), x, y, size: font_size, color });
    }

    // ── Codepoints ────────────────────────────────────────────────────────

    /// Codepoints of `text`, in a library-owned array.
    pub fn load_codepoints(&self, text: &str) -> RawBuffer<i32> {
        let codepoints: Vec<i32> = text.chars().map(|c| c as i32).collect();
        let len = codepoints.len();
        RawBuffer { ptr: self.ledger().insert(codepoints), len }
    }

    pub fn unload_codepoints(&self, codepoints: RawBuffer<i32>) {
        self.ledger().take(codepoints.ptr as *const i32);
    }

    pub fn get_codepoint_count(&self, text: &str) -> i32 {
        text.chars().count() as i32
    }

    /// Encode codepoints as UTF-8; invalid ones become '?'.
    pub fn load_utf8(&self, codepoints: &[i32]) -> String {
        codepoints
            .iter()
            .map(|&cp| u32::try_from(cp).ok().and_then(char::from_u32).unwrap_or('?'))
            .collect()
    }

    pub fn text_split(&self, text: &str, delimiter: char) -> Vec<String> {
        text.split(delimiter).take(MAX_TEXT_SPLIT).map(str::to_string).collect()
    }
}
