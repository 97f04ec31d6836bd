/// `native/`: the headless native library
///
/// A CPU-only implementation of the C-style graphics/audio API the bindings
/// call into. It keeps the library's manual resource model: load/gen calls
/// hand out structs whose pointer fields refer to library-owned buffers, and
/// nothing is reclaimed until the matching unload call. Buffers live in a
/// ledger keyed by address, so a bad or stale pointer is a logged no-op
/// rather than undefined behaviour.
///
/// Drawing is recorded into a per-frame command list; audio is mixed for
/// real and sent to the default output device through `cpal`.
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    ffi::c_void,
    path::Path,
    ptr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use crate::{
    audio::system::AudioSystem,
    config::{AudioConfig, HeadlessConfig},
    marshal::values::{Color, NPatchInfo, Rectangle, Vector2},
};

pub mod audio;
pub mod math;
pub mod models;
pub mod text;
pub mod textures;
pub mod types;

use types::RawBuffer;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Buffer ledger ─────────────────────────────────────────────────────────────

/// Library-owned heap blocks, keyed by the address handed out.
#[derive(Default)]
pub(crate) struct BufferLedger {
    blocks: HashMap<usize, Box<dyn Any>>,
}

// SAFETY: blocks hold plain data. Pointer fields inside them (glyph images,
// model meshes) point at other ledger blocks and are only followed by the
// library while it holds the ledger lock.
unsafe impl Send for BufferLedger {}

impl BufferLedger {
    /// Take ownership of `items`; empty vectors give a null pointer.
    pub(crate) fn insert<T: 'static>(&mut self, mut items: Vec<T>) -> *mut T {
        if items.is_empty() {
            return ptr::null_mut();
        }
        let ptr = items.as_mut_ptr();
        self.blocks.insert(ptr as usize, Box::new(items));
        ptr
    }

    /// Run `f` over the block at `ptr`, if it exists and holds `T`s.
    pub(crate) fn with<T: 'static, R>(&mut self, ptr: *const T, f: impl FnOnce(&mut [T]) -> R) -> Option<R> {
        if ptr.is_null() {
            return None;
        }
        let block = self.blocks.get_mut(&(ptr as usize))?;
        block.downcast_mut::<Vec<T>>().map(|v| f(v.as_mut_slice()))
    }

    pub(crate) fn take<T: 'static>(&mut self, ptr: *const T) -> Option<Vec<T>> {
        if ptr.is_null() {
            return None;
        }
        let key = ptr as usize;
        if !self.blocks.get(&key)?.is::<Vec<T>>() {
            return None;
        }
        self.blocks.remove(&key)?.downcast::<Vec<T>>().ok().map(|b| *b)
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}

// ── Frame recording ───────────────────────────────────────────────────────────

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    Rectangle { rec: Rectangle, color: Color },
    LineStrip { points: Vec<Vector2>, color: Color },
    TriangleFan { points: Vec<Vector2>, color: Color },
    Texture { id: u32, x: i32, y: i32, tint: Color },
    TextureNPatch { id: u32, info: NPatchInfo, dest: Rectangle, origin: Vector2, rotation: f32, tint: Color },
    Text { text: String, x: i32, y: i32, size: i32, color: Color },
}

struct Screen {
    ready: bool,
    title: String,
    width: i32,
    height: i32,
    target_fps: u32,
    frames: u64,
    frame_time: f32,
    last_frame: Instant,
    drawing: bool,
    current: Vec<DrawCommand>,
    presented: Vec<DrawCommand>,
}

// ── Library ───────────────────────────────────────────────────────────────────

pub struct NativeLibrary {
    config: HeadlessConfig,
    started: Instant,
    ledger: Mutex<BufferLedger>,
    screen: Mutex<Screen>,
    textures: Mutex<HashSet<u32>>,
    next_texture: AtomicU32,
    default_font: Mutex<Option<text::DefaultFont>>,
    audio: Mutex<AudioSystem>,
}

impl NativeLibrary {
    pub fn new(config: HeadlessConfig, audio: AudioConfig) -> Self {
        let now = Instant::now();
        Self {
            screen: Mutex::new(Screen {
                ready: false,
                title: String::new(),
                width: config.screen_width,
                height: config.screen_height,
                target_fps: 0,
                frames: 0,
                frame_time: 0.0,
                last_frame: now,
                drawing: false,
                current: Vec::new(),
                presented: Vec::new(),
            }),
            config,
            started: now,
            ledger: Mutex::new(BufferLedger::default()),
            textures: Mutex::new(HashSet::new()),
            next_texture: AtomicU32::new(1),
            default_font: Mutex::new(None),
            audio: Mutex::new(AudioSystem::new(audio)),
        }
    }

    /// A library without an audio device, for tests and batch runs.
    pub fn headless(config: HeadlessConfig) -> Self {
        Self::new(config, AudioConfig { open_device: false, ..Default::default() })
    }

    pub(crate) fn ledger(&self) -> MutexGuard<'_, BufferLedger> {
        lock(&self.ledger)
    }

    pub(crate) fn audio(&self) -> MutexGuard<'_, AudioSystem> {
        lock(&self.audio)
    }

    /// Number of library-owned buffers still waiting for an unload call.
    pub fn live_buffers(&self) -> usize {
        self.ledger().len()
    }

    pub(crate) fn alloc_texture_id(&self) -> u32 {
        let id = self.next_texture.fetch_add(1, Ordering::Relaxed);
        lock(&self.textures).insert(id);
        id
    }

    pub(crate) fn free_texture_id(&self, id: u32) -> bool {
        lock(&self.textures).remove(&id)
    }

    pub fn live_textures(&self) -> usize {
        lock(&self.textures).len()
    }

    // ── Window ────────────────────────────────────────────────────────────

    pub fn init_window(&self, width: i32, height: i32, title: &str) {
        let mut screen = lock(&self.screen);
        if width > 0 && height > 0 {
            screen.width = width;
            screen.height = height;
        }
        screen.title = title.to_string();
        screen.ready = true;
        screen.frames = 0;
        screen.last_frame = Instant::now();
        log::info!("DISPLAY: Headless window initialized: {} x {} \"{title}\"", screen.width, screen.height);
    }

    pub fn close_window(&self) {
        let mut screen = lock(&self.screen);
        screen.ready = false;
        screen.current.clear();
        log::info!("Window closed successfully");
    }

    pub fn is_window_ready(&self) -> bool {
        lock(&self.screen).ready
    }

    /// True once the configured frame budget is spent or the window is gone.
    pub fn window_should_close(&self) -> bool {
        let screen = lock(&self.screen);
        !screen.ready || self.config.frame_limit.is_some_and(|limit| screen.frames >= limit)
    }

    pub fn window_title(&self) -> String {
        lock(&self.screen).title.clone()
    }

    pub fn screen_width(&self) -> i32 {
        lock(&self.screen).width
    }

    pub fn screen_height(&self) -> i32 {
        lock(&self.screen).height
    }

    pub fn set_target_fps(&self, fps: i32) {
        lock(&self.screen).target_fps = fps.max(0) as u32;
        log::info!("TIMER: Target time per frame: {:.3} milliseconds", if fps > 0 { 1000.0 / fps as f32 } else { 0.0 });
    }

    pub fn frame_time(&self) -> f32 {
        lock(&self.screen).frame_time
    }

    /// Seconds since the library was created.
    pub fn time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn frame_count(&self) -> u64 {
        lock(&self.screen).frames
    }

    // ── Drawing ───────────────────────────────────────────────────────────

    pub fn begin_drawing(&self) {
        let mut screen = lock(&self.screen);
        screen.drawing = true;
        screen.current.clear();
    }

    /// Present the frame and wait out the rest of the frame budget.
    pub fn end_drawing(&self) {
        self.end_drawing_with(std::thread::sleep);
    }

    /// Present the frame and hand the rest of the frame budget (possibly
    /// zero) to `wait_out`.
    pub fn end_drawing_with(&self, wait_out: impl FnOnce(Duration)) {
        let wait = {
            let mut screen = lock(&self.screen);
            if !screen.drawing {
                log::debug!("EndDrawing called without BeginDrawing");
            }
            screen.drawing = false;
            screen.presented = std::mem::take(&mut screen.current);
            screen.frames += 1;
            let elapsed = screen.last_frame.elapsed();
            let budget = match screen.target_fps {
                0 => Duration::ZERO,
                fps => Duration::from_secs_f64(1.0 / fps as f64),
            };
            budget.saturating_sub(elapsed)
        };
        wait_out(wait);
        let mut screen = lock(&self.screen);
        screen.frame_time = screen.last_frame.elapsed().as_secs_f32();
        screen.last_frame = Instant::now();
    }

    pub(crate) fn record(&self, command: DrawCommand) {
        lock(&self.screen).current.push(command);
    }

    /// Commands of the last presented frame.
    pub fn presented_frame(&self) -> Vec<DrawCommand> {
        lock(&self.screen).presented.clone()
    }

    /// Commands recorded since the last `begin_drawing`.
    pub fn pending_frame(&self) -> Vec<DrawCommand> {
        lock(&self.screen).current.clone()
    }

    pub fn clear_background(&self, color: Color) {
        self.record(DrawCommand::Clear(color));
    }

    pub fn draw_rectangle_rec(&self, rec: Rectangle, color: Color) {
        self.record(DrawCommand::Rectangle { rec, color });
    }

    pub fn draw_line_strip(&self, points: &[Vector2], color: Color) {
        if points.len() >= 2 {
            self.record(DrawCommand::LineStrip { points: points.to_vec(), color });
        }
    }

    pub fn draw_triangle_fan(&self, points: &[Vector2], color: Color) {
        if points.len() >= 3 {
            self.record(DrawCommand::TriangleFan { points: points.to_vec(), color });
        }
    }

    // ── Files ─────────────────────────────────────────────────────────────

    /// Read a whole file into a library-owned buffer. Release it with
    /// [`NativeLibrary::unload_file_data`].
    pub fn load_file_data(&self, file_name: &str) -> RawBuffer<u8> {
        match std::fs::read(file_name) {
            Ok(bytes) => {
                log::info!("FILEIO: [{file_name}] File loaded successfully");
                let len = bytes.len();
                let ptr = self.ledger().insert(bytes);
                RawBuffer { ptr, len }
            }
            Err(e) => {
                log::warn!("FILEIO: [{file_name}] Failed to open file: {e}");
                RawBuffer::empty()
            }
        }
    }

    pub fn unload_file_data(&self, data: *mut c_void) {
        if self.ledger().take(data as *const u8).is_none() && !data.is_null() {
            log::warn!("FILEIO: Unload of unknown file data {data:p}");
        }
    }

    /// Copy of the bytes behind a pointer from `load_file_data`, cut to `size`.
    pub fn file_data_bytes(&self, data: *const c_void, size: usize) -> Option<Vec<u8>> {
        self.ledger().with(data as *const u8, |bytes| bytes[..size.min(bytes.len())].to_vec())
    }

    pub fn load_file_text(&self, file_name: &str) -> Option<String> {
        match std::fs::read_to_string(Path::new(file_name)) {
            Ok(text) => {
                log::info!("FILEIO: [{file_name}] Text file loaded successfully");
                Some(text)
            }
            Err(e) => {
                log::warn!("FILEIO: [{file_name}] Failed to open text file: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib() -> NativeLibrary {
        NativeLibrary::headless(HeadlessConfig { frame_limit: Some(2), ..Default::default() })
    }

    #[test]
    fn ledger_hands_out_null_for_empty() {
        let mut ledger = BufferLedger::default();
        assert!(ledger.insert(Vec::<u8>::new()).is_null());
        let p = ledger.insert(vec![1u16, 2, 3]) as *const u16;
        assert_eq!(ledger.with(p, |s| s.len()), Some(3));
        assert_eq!(ledger.with(p as *const u8, |s| s.len()), None);
        assert_eq!(ledger.take(p as *const u32), None);
        assert_eq!(ledger.take(p), Some(vec![1, 2, 3]));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn frames_count_towards_the_limit() {
        let lib = lib();
        assert!(lib.window_should_close());
        lib.init_window(320, 240, "test");
        assert_eq!((lib.screen_width(), lib.window_title().as_str()), (320, "test"));
        assert!(!lib.window_should_close());
        for _ in 0..2 {
            lib.begin_drawing();
            lib.clear_background(Color::RAYWHITE);
            lib.end_drawing();
        }
        assert!(lib.window_should_close());
        assert_eq!(lib.presented_frame(), vec![DrawCommand::Clear(Color::RAYWHITE)]);
    }

    #[test]
    fn degenerate_shapes_are_not_recorded() {
        let lib = lib();
        lib.draw_line_strip(&[Vector2::new(0.0, 0.0)], Color::RED);
        lib.draw_triangle_fan(&[Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0)], Color::RED);
        assert!(lib.pending_frame().is_empty());
        lib.draw_line_strip(&[Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0)], Color::RED);
        assert_eq!(lib.pending_frame().len(), 1);
    }

    #[test]
    fn file_data_lives_until_unloaded() {
        let path = std::env::temp_dir().join(format!("raylua-data-{}.bin", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        let lib = lib();
        let data = lib.load_file_data(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);
        assert_eq!(data.len, 4);
        assert_eq!(lib.file_data_bytes(data.ptr as *const c_void, 2), Some(vec![1, 2]));
        lib.unload_file_data(data.ptr as *mut c_void);
        assert_eq!(lib.live_buffers(), 0);
        assert!(lib.load_file_data("/nonexistent/raylua").is_empty());
    }
}
