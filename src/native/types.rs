/// `native/types.rs`: native resource structs
///
/// These are the by-value structs the native library hands out from its
/// load/gen functions. Pointer fields refer to library-owned buffers and are
/// only meaningful to the library itself; the binding layer copies the
/// structs around but never dereferences them.
use std::{ffi::c_void, ptr};

use crate::marshal::values::{Color, Matrix};

pub const PIXELFORMAT_UNCOMPRESSED_R8G8B8A8: i32 = 7;

pub const CUBEMAP_LAYOUT_AUTO_DETECT: i32 = 0;
pub const CUBEMAP_LAYOUT_LINE_VERTICAL: i32 = 1;
pub const CUBEMAP_LAYOUT_LINE_HORIZONTAL: i32 = 2;
pub const CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR: i32 = 3;
pub const CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE: i32 = 4;

pub const NPATCH_NINE_PATCH: i32 = 0;
pub const NPATCH_THREE_PATCH_VERTICAL: i32 = 1;
pub const NPATCH_THREE_PATCH_HORIZONTAL: i32 = 2;

pub const MAX_MATERIAL_MAPS: usize = 12;
pub const MATERIAL_MAP_DIFFUSE: usize = 0;
pub const MATERIAL_MAP_SPECULAR: usize = 1;

/// CPU pixel data, always RGBA8 in this library.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Image {
    pub data: *mut c_void,
    pub width: i32,
    pub height: i32,
    pub mipmaps: i32,
    pub format: i32,
}

impl Default for Image {
    fn default() -> Self {
        Self { data: ptr::null_mut(), width: 0, height: 0, mipmaps: 0, format: 0 }
    }
}

impl Image {
    pub fn pixel_count(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Texture {
    pub id: u32,
    pub width: i32,
    pub height: i32,
    pub mipmaps: i32,
    pub format: i32,
}

/// Six-face texture. Same layout as [`Texture`], distinct handle type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cubemap(pub Texture);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderTexture {
    pub id: u32,
    pub texture: Texture,
    pub depth: Texture,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphInfo {
    pub value: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub advance_x: i32,
    pub image: Image,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub base_size: i32,
    pub glyph_count: i32,
    pub glyph_padding: i32,
    pub texture: Texture,
    pub recs: *mut crate::marshal::values::Rectangle,
    pub glyphs: *mut GlyphInfo,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            base_size: 0,
            glyph_count: 0,
            glyph_padding: 0,
            texture: Texture::default(),
            recs: ptr::null_mut(),
            glyphs: ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub vertex_count: i32,
    pub triangle_count: i32,
    pub vertices: *mut f32,
    pub texcoords: *mut f32,
    pub normals: *mut f32,
    pub indices: *mut u16,
    pub vao_id: u32,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            triangle_count: 0,
            vertices: ptr::null_mut(),
            texcoords: ptr::null_mut(),
            normals: ptr::null_mut(),
            indices: ptr::null_mut(),
            vao_id: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialMap {
    pub texture: Texture,
    pub color: Color,
    pub value: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub shader_id: u32,
    pub maps: *mut MaterialMap,
    pub params: [f32; 4],
}

impl Default for Material {
    fn default() -> Self {
        Self { shader_id: 0, maps: ptr::null_mut(), params: [0.0; 4] }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    pub transform: Matrix,
    pub mesh_count: i32,
    pub material_count: i32,
    pub meshes: *mut Mesh,
    pub materials: *mut Material,
    pub mesh_material: *mut i32,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            transform: Matrix::default(),
            mesh_count: 0,
            material_count: 0,
            meshes: ptr::null_mut(),
            materials: ptr::null_mut(),
            mesh_material: ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModelAnimation {
    pub bone_count: i32,
    pub frame_count: i32,
    pub name: [u8; 32],
}

/// PCM data, interleaved 32-bit float samples.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wave {
    pub frame_count: u32,
    pub sample_rate: u32,
    pub sample_size: u32,
    pub channels: u32,
    pub data: *mut c_void,
}

impl Default for Wave {
    fn default() -> Self {
        Self { frame_count: 0, sample_rate: 0, sample_size: 0, channels: 0, data: ptr::null_mut() }
    }
}

impl Wave {
    pub fn sample_count(&self) -> usize {
        self.frame_count as usize * self.channels as usize
    }
}

/// `buffer` is the mixer voice id; 0 means "not loaded".
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioStream {
    pub buffer: u32,
    pub sample_rate: u32,
    pub sample_size: u32,
    pub channels: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sound {
    pub stream: AudioStream,
    pub frame_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Music {
    pub stream: AudioStream,
    pub frame_count: u32,
    pub looping: bool,
    pub ctx_type: i32,
}

/// A library-allocated, length-tracked block of `T`.
///
/// Returned by `Load*` calls that hand out arrays; the matching `Unload*`
/// call gives the memory back. Null with `len == 0` for empty results.
#[derive(Debug)]
pub struct RawBuffer<T> {
    pub ptr: *mut T,
    pub len: usize,
}

impl<T> RawBuffer<T> {
    pub fn empty() -> Self {
        Self { ptr: ptr::null_mut(), len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_null() || self.len == 0
    }
}
