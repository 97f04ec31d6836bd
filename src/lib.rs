/// `raylua-bridge`: Lua 5.4 bindings for a raylib-style graphics and audio API
///
/// Native structs cross into Lua as tables (plain values) or typed handles
/// (resources), arrays are marshalled through scoped buffers, and audio
/// callbacks re-enter the script through a trampoline.
pub mod audio;
pub mod bindings;
pub mod config;
pub mod error;
pub mod marshal;
pub mod native;
pub mod scripting;

pub use config::BindingConfig;
pub use scripting::host::{HostError, ScriptHost, ScriptRunResult};
