/// `audio/`: playback engine behind the native audio API
///
/// Voices are mixed on the CPAL output thread, or rendered on demand when no
/// device is open. The main thread talks to the mixer through a lock-free
/// command queue.
pub mod decoder;
pub mod device;
pub mod mixer;
pub mod system;
