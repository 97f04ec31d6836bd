/// `native/textures.rs`: images (CPU pixels) and textures (ids)
///
/// Image pixels are RGBA8 `Color`s in the ledger; `Image::data` is the key.
/// Operations that change the pixel count allocate a new block and swap the
/// pointer inside the caller's struct.
use std::ffi::c_void;

use super::{
    types::{Cubemap, Image, RawBuffer, RenderTexture, Texture, PIXELFORMAT_UNCOMPRESSED_R8G8B8A8},
    DrawCommand, NativeLibrary,
};
use crate::marshal::values::{Color, NPatchInfo, Rectangle, Vector2};

const DEPTH_COMPONENT_FORMAT: i32 = 19;

use super::types::{
    CUBEMAP_LAYOUT_AUTO_DETECT, CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE, CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR,
    CUBEMAP_LAYOUT_LINE_HORIZONTAL, CUBEMAP_LAYOUT_LINE_VERTICAL,
};

impl NativeLibrary {
    fn new_image(&self, width: i32, height: i32, pixels: Vec<Color>) -> Image {
        let data = self.ledger().insert(pixels) as *mut c_void;
        Image { data, width, height, mipmaps: 1, format: PIXELFORMAT_UNCOMPRESSED_R8G8B8A8 }
    }

    /// Copy of the pixels behind `image`, row-major.
    pub(crate) fn image_pixels(&self, image: &Image) -> Option<Vec<Color>> {
        self.ledger().with(image.data as *const Color, |px| px.to_vec())
    }

    fn replace_pixels(&self, image: &mut Image, width: i32, height: i32, pixels: Vec<Color>) {
        self.ledger().take(image.data as *const Color);
        *image = self.new_image(width, height, pixels);
    }

    /// Room for `width * height` pixels, or `None` when the allocator refuses.
    fn reserve_pixels(width: i32, height: i32) -> Option<Vec<Color>> {
        let count = (width.max(0) as usize).checked_mul(height.max(0) as usize)?;
        let mut pixels = Vec::new();
        match pixels.try_reserve_exact(count) {
            Ok(()) => Some(pixels),
            Err(_) => {
                log::warn!("IMAGE: Cannot allocate {width}x{height} pixels");
                None
            }
        }
    }

    pub fn gen_image_color(&self, width: i32, height: i32, color: Color) -> Image {
        let Some(mut pixels) = Self::reserve_pixels(width, height) else { return Image::default() };
        pixels.resize((width.max(0) as usize).saturating_mul(height.max(0) as usize), color);
        self.new_image(width, height, pixels)
    }

    pub fn gen_image_checked(&self, width: i32, height: i32, checks_x: i32, checks_y: i32, col1: Color, col2: Color) -> Image {
        let (w, h) = (width.max(0), height.max(0));
        let (cx, cy) = (checks_x.max(1), checks_y.max(1));
        let Some(mut pixels) = Self::reserve_pixels(w, h) else { return Image::default() };
        for y in 0..h {
            for x in 0..w {
                pixels.push(if (x / cx + y / cy) % 2 == 0 { col1 } else { col2 });
            }
        }
        self.new_image(width, height, pixels)
    }

    pub fn is_image_valid(&self, image: &Image) -> bool {
        !image.data.is_null() && image.width > 0 && image.height > 0 && image.format > 0 && image.mipmaps > 0
    }

    pub fn image_copy(&self, image: &Image) -> Image {
        match self.image_pixels(image) {
            Some(pixels) => self.new_image(image.width, image.height, pixels),
            None => {
                log::warn!("IMAGE: Copy of invalid image");
                Image::default()
            }
        }
    }

    pub fn unload_image(&self, image: Image) {
        if self.ledger().take(image.data as *const Color).is_some() {
            log::debug!("IMAGE: Unloaded image data");
        } else if !image.data.is_null() {
            log::warn!("IMAGE: Unload of unknown image data {:p}", image.data);
        }
    }

    /// Bilinear resize.
    pub fn image_resize(&self, image: &mut Image, new_width: i32, new_height: i32) {
        let Some(src) = self.image_pixels(image) else { return };
        if new_width <= 0 || new_height <= 0 {
            return;
        }
        let (sw, sh) = (image.width as usize, image.height as usize);
        let (dw, dh) = (new_width as usize, new_height as usize);
        let mut out = Vec::with_capacity(dw * dh);
        let sx = sw as f32 / dw as f32;
        let sy = sh as f32 / dh as f32;
        for y in 0..dh {
            let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (sh - 1) as f32);
            let (y0, ty) = (fy as usize, fy.fract());
            let y1 = (y0 + 1).min(sh - 1);
            for x in 0..dw {
                let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (sw - 1) as f32);
                let (x0, tx) = (fx as usize, fx.fract());
                let x1 = (x0 + 1).min(sw - 1);
                let top = lerp_color(src[y0 * sw + x0], src[y0 * sw + x1], tx);
                let bottom = lerp_color(src[y1 * sw + x0], src[y1 * sw + x1], tx);
                out.push(lerp_color(top, bottom, ty));
            }
        }
        self.replace_pixels(image, new_width, new_height, out);
    }

    /// Nearest-neighbor resize.
    pub fn image_resize_nn(&self, image: &mut Image, new_width: i32, new_height: i32) {
        let Some(src) = self.image_pixels(image) else { return };
        if new_width <= 0 || new_height <= 0 {
            return;
        }
        let (sw, sh) = (image.width as usize, image.height as usize);
        let (dw, dh) = (new_width as usize, new_height as usize);
        let x_ratio = ((sw << 16) / dw) + 1;
        let y_ratio = ((sh << 16) / dh) + 1;
        let mut out = Vec::with_capacity(dw * dh);
        for y in 0..dh {
            for x in 0..dw {
                let x2 = ((x * x_ratio) >> 16).min(sw - 1);
                let y2 = ((y * y_ratio) >> 16).min(sh - 1);
                out.push(src[y2 * sw + x2]);
            }
        }
        self.replace_pixels(image, new_width, new_height, out);
    }

    pub fn image_crop(&self, image: &mut Image, crop: Rectangle) {
        let Some(src) = self.image_pixels(image) else { return };
        // Clamp the edges to the image in f64 so extreme rectangles cannot
        // overflow the integer arithmetic.
        let (iw, ih) = (f64::from(image.width.max(0)), f64::from(image.height.max(0)));
        let left = f64::from(crop.x).trunc();
        let top = f64::from(crop.y).trunc();
        let right = left + f64::from(crop.width).trunc();
        let bottom = top + f64::from(crop.height).trunc();
        let x = left.clamp(0.0, iw) as i32;
        let y = top.clamp(0.0, ih) as i32;
        let w = right.clamp(0.0, iw) as i32 - x;
        let h = bottom.clamp(0.0, ih) as i32 - y;
        if w <= 0 || h <= 0 {
            log::warn!("IMAGE: Failed to crop, rectangle out of bounds");
            return;
        }
        let sw = image.width as usize;
        let mut out = Vec::with_capacity(w as usize * h as usize);
        for row in y..y + h {
            let start = row as usize * sw + x as usize;
            out.extend_from_slice(&src[start..start + w as usize]);
        }
        self.replace_pixels(image, w, h, out);
    }

    pub fn image_flip_vertical(&self, image: &mut Image) {
        let width = image.width.max(0) as usize;
        let flipped = self.ledger().with(image.data as *const Color, |px| {
            let rows = px.len() / width.max(1);
            for r in 0..rows / 2 {
                let (top, bottom) = px.split_at_mut((rows - 1 - r) * width);
                top[r * width..(r + 1) * width].swap_with_slice(&mut bottom[..width]);
            }
        });
        if flipped.is_none() {
            log::warn!("IMAGE: Flip of invalid image");
        }
    }

    pub fn image_draw_pixel(&self, image: &mut Image, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= image.width || y >= image.height {
            return;
        }
        let index = (y * image.width + x) as usize;
        self.ledger().with(image.data as *const Color, |px| {
            if let Some(p) = px.get_mut(index) {
                *p = color;
            }
        });
    }

    pub fn image_draw_rectangle_rec(&self, image: &mut Image, rec: Rectangle, color: Color) {
        let x0 = (rec.x as i32).max(0);
        let y0 = (rec.y as i32).max(0);
        let x1 = ((rec.x + rec.width) as i32).min(image.width);
        let y1 = ((rec.y + rec.height) as i32).min(image.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let width = image.width as usize;
        self.ledger().with(image.data as *const Color, |px| {
            for y in y0 as usize..y1 as usize {
                px[y * width + x0 as usize..y * width + x1 as usize].fill(color);
            }
        });
    }

    pub fn get_image_color(&self, image: &Image, x: i32, y: i32) -> Color {
        if x < 0 || y < 0 || x >= image.width || y >= image.height {
            log::warn!("Requested image pixel ({x}, {y}) out of bounds");
            return Color::default();
        }
        let index = (y * image.width + x) as usize;
        self.ledger()
            .with(image.data as *const Color, |px| px.get(index).copied())
            .flatten()
            .unwrap_or_default()
    }

    /// Pixel array handed to the caller; give it back with
    /// [`NativeLibrary::unload_image_colors`].
    pub fn load_image_colors(&self, image: &Image) -> RawBuffer<Color> {
        match self.image_pixels(image) {
            Some(pixels) => {
                let len = pixels.len();
                RawBuffer { ptr: self.ledger().insert(pixels), len }
            }
            None => RawBuffer::empty(),
        }
    }

    pub fn unload_image_colors(&self, colors: RawBuffer<Color>) {
        self.ledger().take(colors.ptr as *const Color);
    }

    // ── Textures ──────────────────────────────────────────────────────────

    pub fn load_texture_from_image(&self, image: &Image) -> Texture {
        if !self.is_image_valid(image) {
            log::warn!("TEXTURE: Failed to load texture, invalid image");
            return Texture::default();
        }
        let id = self.alloc_texture_id();
        log::info!("TEXTURE: [ID {id}] Texture loaded successfully ({}x{})", image.width, image.height);
        Texture { id, width: image.width, height: image.height, mipmaps: image.mipmaps, format: image.format }
    }

    /// Cube map from a strip or cross layout image.
    pub fn load_texture_cubemap(&self, image: &Image, layout: i32) -> Cubemap {
        let (w, h) = (image.width, image.height);
        let layout = if layout == CUBEMAP_LAYOUT_AUTO_DETECT {
            if w > h {
                if w / 6 == h {
                    CUBEMAP_LAYOUT_LINE_HORIZONTAL
                } else if w / 4 == h / 3 {
                    CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE
                } else {
                    CUBEMAP_LAYOUT_AUTO_DETECT
                }
            } else if h > w {
                if h / 6 == w {
                    CUBEMAP_LAYOUT_LINE_VERTICAL
                } else if w / 3 == h / 4 {
                    CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR
                } else {
                    CUBEMAP_LAYOUT_AUTO_DETECT
                }
            } else {
                CUBEMAP_LAYOUT_AUTO_DETECT
            }
        } else {
            layout
        };
        let size = match layout {
            CUBEMAP_LAYOUT_LINE_VERTICAL => w,
            CUBEMAP_LAYOUT_LINE_HORIZONTAL => h,
            CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR => w / 3,
            CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE => w / 4,
            _ => 0,
        };
        if size <= 0 || !self.is_image_valid(image) {
            log::warn!("IMAGE: Failed to load cubemap image");
            return Cubemap::default();
        }
        let id = self.alloc_texture_id();
        log::info!("TEXTURE: [ID {id}] Cubemap texture loaded successfully ({size}x{size})");
        Cubemap(Texture { id, width: size, height: size, mipmaps: 1, format: image.format })
    }

    pub fn load_render_texture(&self, width: i32, height: i32) -> RenderTexture {
        if width <= 0 || height <= 0 {
            log::warn!("FBO: Invalid render texture size {width}x{height}");
            return RenderTexture::default();
        }
        let id = self.alloc_texture_id();
        let color = self.alloc_texture_id();
        let depth = self.alloc_texture_id();
        log::info!("FBO: [ID {id}] Framebuffer object created successfully");
        RenderTexture {
            id,
            texture: Texture { id: color, width, height, mipmaps: 1, format: PIXELFORMAT_UNCOMPRESSED_R8G8B8A8 },
            depth: Texture { id: depth, width, height, mipmaps: 1, format: DEPTH_COMPONENT_FORMAT },
        }
    }

    pub fn is_texture_valid(&self, texture: &Texture) -> bool {
        texture.id > 0 && texture.width > 0 && texture.height > 0 && texture.format > 0 && texture.mipmaps > 0
    }

    pub fn unload_texture(&self, texture: Texture) {
        if texture.id == 0 {
            return;
        }
        if self.free_texture_id(texture.id) {
            log::info!("TEXTURE: [ID {}] Unloaded texture data from VRAM (GPU)", texture.id);
        } else {
            log::warn!("TEXTURE: [ID {}] Unload of unknown texture", texture.id);
        }
    }

    pub fn unload_render_texture(&self, target: RenderTexture) {
        if target.id == 0 {
            return;
        }
        self.free_texture_id(target.texture.id);
        self.free_texture_id(target.depth.id);
        self.free_texture_id(target.id);
        log::info!("FBO: [ID {}] Unloaded framebuffer from VRAM (GPU)", target.id);
    }

    pub fn draw_texture(&self, texture: &Texture, x: i32, y: i32, tint: Color) {
        self.record(DrawCommand::Texture { id: texture.id, x, y, tint });
    }

    pub fn draw_texture_npatch(
        &self,
        texture: &Texture,
        info: NPatchInfo,
        dest: Rectangle,
        origin: Vector2,
        rotation: f32,
        tint: Color,
    ) {
        if texture.id == 0 || dest.width <= 0.0 || dest.height <= 0.0 {
            return;
        }
        self.record(DrawCommand::TextureNPatch { id: texture.id, info, dest, origin, rotation, tint });
    }
}

fn lerp_color(a: Color, b: Color, t: f32) -> Color {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Color::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeadlessConfig;

    fn lib() -> NativeLibrary {
        NativeLibrary::headless(HeadlessConfig::default())
    }

    #[test]
    fn generated_image_holds_its_color() {
        let lib = lib();
        let img = lib.gen_image_color(4, 3, Color::RED);
        assert!(lib.is_image_valid(&img));
        assert_eq!(img.pixel_count(), 12);
        assert_eq!(lib.get_image_color(&img, 3, 2), Color::RED);
        assert_eq!(lib.get_image_color(&img, 4, 0), Color::default());
        lib.unload_image(img);
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn checked_image_alternates() {
        let lib = lib();
        let img = lib.gen_image_checked(4, 4, 2, 2, Color::BLACK, Color::WHITE);
        assert_eq!(lib.get_image_color(&img, 0, 0), Color::BLACK);
        assert_eq!(lib.get_image_color(&img, 2, 0), Color::WHITE);
        assert_eq!(lib.get_image_color(&img, 2, 2), Color::BLACK);
        lib.unload_image(img);
    }

    #[test]
    fn resize_and_crop_replace_the_buffer() {
        let lib = lib();
        let mut img = lib.gen_image_checked(4, 4, 1, 1, Color::BLACK, Color::WHITE);
        lib.image_resize_nn(&mut img, 8, 8);
        assert_eq!((img.width, img.height), (8, 8));
        assert_eq!(lib.live_buffers(), 1);
        assert_eq!(lib.get_image_color(&img, 1, 1), Color::BLACK);
        assert_eq!(lib.get_image_color(&img, 2, 0), Color::WHITE);

        lib.image_crop(&mut img, Rectangle::new(2.0, 0.0, 4.0, 2.0));
        assert_eq!((img.width, img.height), (4, 2));
        assert_eq!(lib.get_image_color(&img, 0, 0), Color::WHITE);

        lib.image_resize(&mut img, 2, 1);
        assert_eq!((img.width, img.height), (2, 1));
        lib.unload_image(img);
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn crop_clamps_extreme_rectangles() {
        let lib = lib();
        let mut img = lib.gen_image_color(4, 3, Color::RED);
        lib.image_crop(&mut img, Rectangle::new(-3e9, 0.0, 2.0, 2.0));
        assert_eq!((img.width, img.height), (4, 3));
        lib.image_crop(&mut img, Rectangle::new(-3e9, -3e9, 6e9, 6e9));
        assert_eq!((img.width, img.height), (4, 3));
        lib.image_crop(&mut img, Rectangle::new(1.0, 1.0, 3e9, 3e9));
        assert_eq!((img.width, img.height), (3, 2));
        lib.image_crop(&mut img, Rectangle::new(3e9, 0.0, 1.0, 1.0));
        assert_eq!((img.width, img.height), (3, 2));
        assert_eq!(lib.get_image_color(&img, 2, 1), Color::RED);
        lib.unload_image(img);
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn oversized_generation_fails_cleanly() {
        let lib = lib();
        let checked = lib.gen_image_checked(i32::MAX, i32::MAX, 8, 8, Color::BLACK, Color::WHITE);
        assert!(!lib.is_image_valid(&checked));
        let plain = lib.gen_image_color(i32::MAX, i32::MAX, Color::RED);
        assert!(!lib.is_image_valid(&plain));
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn draw_and_flip_edit_in_place() {
        let lib = lib();
        let mut img = lib.gen_image_color(2, 3, Color::BLANK);
        lib.image_draw_pixel(&mut img, 1, 0, Color::GREEN);
        lib.image_draw_rectangle_rec(&mut img, Rectangle::new(0.0, 2.0, 5.0, 5.0), Color::BLUE);
        lib.image_flip_vertical(&mut img);
        assert_eq!(lib.get_image_color(&img, 1, 2), Color::GREEN);
        assert_eq!(lib.get_image_color(&img, 0, 0), Color::BLUE);
        assert_eq!(lib.get_image_color(&img, 1, 0), Color::BLUE);
        assert_eq!(lib.get_image_color(&img, 0, 1), Color::BLANK);

        let colors = lib.load_image_colors(&img);
        assert_eq!(colors.len, 6);
        assert_eq!(lib.live_buffers(), 2);
        lib.unload_image_colors(colors);
        lib.unload_image(img);
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn textures_track_ids() {
        let lib = lib();
        let img = lib.gen_image_color(6, 1, Color::WHITE);
        let tex = lib.load_texture_from_image(&img);
        assert!(lib.is_texture_valid(&tex));
        let cube = lib.load_texture_cubemap(&img, CUBEMAP_LAYOUT_AUTO_DETECT);
        assert_eq!(cube.0.width, 1);
        let target = lib.load_render_texture(16, 16);
        assert_eq!(lib.live_textures(), 5);
        lib.unload_texture(tex);
        lib.unload_texture(cube.0);
        lib.unload_render_texture(target);
        assert_eq!(lib.live_textures(), 0);

        assert!(!lib.is_texture_valid(&lib.load_texture_from_image(&Image::default())));
        lib.unload_image(img);
    }
}
