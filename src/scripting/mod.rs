/// `scripting/`: the Lua side of the bridge
///
/// One sandboxed VM per host. Native audio callbacks reach script code only
/// through the trampoline; script errors are caught and logged and never
/// reach the audio thread.
pub mod host;
pub mod sandbox;
pub mod trampoline;
