/// `scripting/trampoline.rs`: native audio callbacks -> script functions
///
/// The native library calls back on its audio thread with a raw sample
/// buffer. The trampoline forwards each call to a conventionally named
/// script global, passing `(buffer, frames)`, and swallows every failure:
/// a missing handler, a script error, or a panic never reaches the audio
/// thread.
///
/// Re-entry policy: script code runs on one thread at a time, the owner of
/// the [`ScriptGate`]. A callback arriving while nobody owns the gate runs
/// the handler directly. A callback arriving while the script thread owns it
/// is posted as a job; the script thread runs it at its next yield point
/// (`EndDrawing`, `WindowShouldClose`, `UpdateMusicStream`) and the audio
/// thread waits for the result up to [`HANDOFF_WAIT`]. Past that the buffer
/// passes through untouched and the call counts as busy.
use std::{
    cell::Cell,
    ffi::c_void,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock,
    },
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use mlua::{Function, LightUserData, Lua, Value};

use crate::{audio::mixer::AudioCallback, config::CallbackNames, native::lock};

/// How long a posted callback waits for the script thread to run it.
pub const HANDOFF_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Per-stream processor (`AttachAudioStreamProcessor`).
    StreamProcessor,
    /// Processor over the final mix (`AttachAudioMixedProcessor`).
    MixedProcessor,
    /// Data source of an audio stream (`SetAudioStreamCallback`).
    StreamCallback,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 3] =
        [CallbackKind::StreamProcessor, CallbackKind::MixedProcessor, CallbackKind::StreamCallback];

    fn index(self) -> usize {
        match self {
            CallbackKind::StreamProcessor => 0,
            CallbackKind::MixedProcessor => 1,
            CallbackKind::StreamCallback => 2,
        }
    }
}

/// What happened to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Called,
    /// No global function of the expected name.
    Missing,
    /// The script thread did not reach a yield point in time.
    Busy,
    /// No script context bound, or the kind is not registered.
    Unbound,
    /// The handler raised an error or panicked.
    Failed,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Ownership of the script engine plus the one-slot job queue feeding it.
#[derive(Default)]
pub struct ScriptGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    /// Thread currently running script code.
    owner: Option<ThreadId>,
    job: Option<Job>,
    next_job: u64,
    /// Sample storage reused between jobs.
    spare: Vec<f32>,
}

struct Job {
    id: u64,
    kind: CallbackKind,
    channels: u32,
    samples: Vec<f32>,
    stage: Stage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Queued,
    Running,
    Done(Outcome),
    /// The poster gave up while the handler was running.
    Abandoned,
}

impl ScriptGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the engine for the calling thread, waiting out a handler running
    /// on another thread. Re-entering from the owner is a no-op.
    pub fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut state = lock(&self.state);
        if state.owner == Some(me) {
            return GateGuard { gate: self, release: false };
        }
        while state.owner.is_some() {
            state = self.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        GateGuard { gate: self, release: true }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        lock(&self.state).owner == Some(thread::current().id())
    }

    fn wait_until<'a>(&self, state: MutexGuard<'a, GateState>, deadline: Instant) -> MutexGuard<'a, GateState> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.changed.wait_timeout(state, timeout).unwrap_or_else(PoisonError::into_inner).0
    }
}

/// Releases the gate on drop.
pub struct GateGuard<'a> {
    gate: &'a ScriptGate,
    release: bool,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if self.release {
            lock(&self.gate.state).owner = None;
            self.gate.changed.notify_all();
        }
    }
}

/// The script engine handle the trampoline dispatches into.
#[derive(Clone)]
pub struct ScriptContext {
    pub lua: Lua,
    pub gate: Arc<ScriptGate>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineStats {
    pub invoked: u64,
    pub busy: u64,
    pub missing: u64,
    pub failed: u64,
}

const UNREGISTERED: u8 = 0;
const ACTIVE: u8 = 1;

thread_local! {
    /// Buffer of the handler currently running on this thread.
    static ACTIVE_FRAME: Cell<Option<(*mut f32, usize)>> = const { Cell::new(None) };
}

pub struct Trampoline {
    names: CallbackNames,
    context: RwLock<Option<ScriptContext>>,
    states: [AtomicU8; 3],
    failing: [AtomicU8; 3],
    invoked: AtomicU64,
    busy: AtomicU64,
    missing: AtomicU64,
    failed: AtomicU64,
}

impl Trampoline {
    pub fn new(names: CallbackNames) -> Arc<Self> {
        Arc::new(Self {
            names,
            context: RwLock::new(None),
            states: [AtomicU8::new(UNREGISTERED), AtomicU8::new(UNREGISTERED), AtomicU8::new(UNREGISTERED)],
            failing: [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)],
            invoked: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            missing: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn global_name(&self, kind: CallbackKind) -> &str {
        match kind {
            CallbackKind::StreamProcessor => &self.names.stream_processor,
            CallbackKind::MixedProcessor => &self.names.mixed_processor,
            CallbackKind::StreamCallback => &self.names.stream_callback,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Make `context` the engine every later invocation dispatches into.
    pub fn bind(&self, context: ScriptContext) {
        match self.context.write() {
            Ok(mut slot) => *slot = Some(context),
            Err(poisoned) => *poisoned.into_inner() = Some(context),
        }
    }

    /// Drop the bound context. Breaks the Lua -> library -> trampoline cycle.
    pub fn unbind(&self) {
        match self.context.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.context.read().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Mark `kind` active. Done when the native callback is installed.
    pub fn register(&self, kind: CallbackKind) {
        self.states[kind.index()].store(ACTIVE, Ordering::Release);
        self.failing[kind.index()].store(0, Ordering::Relaxed);
    }

    pub fn unregister(&self, kind: CallbackKind) {
        self.states[kind.index()].store(UNREGISTERED, Ordering::Release);
    }

    pub fn is_active(&self, kind: CallbackKind) -> bool {
        self.states[kind.index()].load(Ordering::Acquire) == ACTIVE
    }

    /// A native callback forwarding to `kind`'s handler. Every call returns a
    /// fresh callback object; keep one around to detach it later.
    pub fn callback(self: &Arc<Self>, kind: CallbackKind) -> AudioCallback {
        let trampoline = Arc::clone(self);
        Arc::new(move |buffer: &mut [f32], channels: u32| {
            trampoline.invoke(kind, buffer, channels);
        })
    }

    pub fn stats(&self) -> TrampolineStats {
        TrampolineStats {
            invoked: self.invoked.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    // ── Hot path ──────────────────────────────────────────────────────────

    /// Forward one native callback to the script.
    ///
    /// `buffer` holds interleaved samples; the script sees
    /// `buffer.len() / channels` frames.
    pub fn invoke(&self, kind: CallbackKind, buffer: &mut [f32], channels: u32) -> Outcome {
        if !self.is_active(kind) {
            return Outcome::Unbound;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(kind, buffer, channels)))
            .unwrap_or_else(|_| {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.report_failure(kind, "handler panicked");
                Outcome::Failed
            });
        if outcome == Outcome::Called {
            self.failing[kind.index()].store(0, Ordering::Relaxed);
        }
        outcome
    }

    fn dispatch(&self, kind: CallbackKind, buffer: &mut [f32], channels: u32) -> Outcome {
        // Never wait on the writer; a rebind in progress counts as unbound.
        let Ok(slot) = self.context.try_read() else { return Outcome::Unbound };
        let Some(ctx) = slot.as_ref() else { return Outcome::Unbound };

        let gate = &ctx.gate;
        let me = thread::current().id();
        let mut state = lock(&gate.state);
        let owner = state.owner;
        match owner {
            Some(owner) if owner == me => {
                drop(state);
                self.run_handler(&ctx.lua, kind, buffer, channels)
            }
            None => {
                state.owner = Some(me);
                drop(state);
                let _release = GateGuard { gate, release: true };
                self.run_handler(&ctx.lua, kind, buffer, channels)
            }
            Some(_) => self.hand_off(ctx, state, kind, buffer, channels),
        }
    }

    /// Post `buffer` to the script thread and wait for it to run the handler.
    fn hand_off(
        &self,
        ctx: &ScriptContext,
        mut state: MutexGuard<'_, GateState>,
        kind: CallbackKind,
        buffer: &mut [f32],
        channels: u32,
    ) -> Outcome {
        let gate = &ctx.gate;
        if state.job.is_some() {
            self.busy.fetch_add(1, Ordering::Relaxed);
            return Outcome::Busy;
        }
        let id = state.next_job;
        state.next_job += 1;
        let mut samples = std::mem::take(&mut state.spare);
        samples.clear();
        samples.extend_from_slice(buffer);
        state.job = Some(Job { id, kind, channels, samples, stage: Stage::Queued });
        gate.changed.notify_all();

        let deadline = Instant::now() + HANDOFF_WAIT;
        loop {
            match state.job.as_ref().map(|job| job.stage) {
                Some(Stage::Done(outcome)) => {
                    if let Some(job) = state.job.take() {
                        let n = buffer.len().min(job.samples.len());
                        buffer[..n].copy_from_slice(&job.samples[..n]);
                        state.spare = job.samples;
                    }
                    return outcome;
                }
                Some(Stage::Queued) if state.owner.is_none() => {
                    // The script returned without reaching a yield point.
                    if let Some(job) = state.job.take() {
                        state.spare = job.samples;
                    }
                    state.owner = Some(thread::current().id());
                    drop(state);
                    let _release = GateGuard { gate, release: true };
                    return self.run_handler(&ctx.lua, kind, buffer, channels);
                }
                Some(_) if Instant::now() < deadline => {}
                Some(Stage::Running) => {
                    if let Some(job) = state.job.as_mut() {
                        job.stage = Stage::Abandoned;
                    }
                    self.busy.fetch_add(1, Ordering::Relaxed);
                    return Outcome::Busy;
                }
                _ => {
                    if let Some(job) = state.job.take() {
                        state.spare = job.samples;
                    }
                    self.busy.fetch_add(1, Ordering::Relaxed);
                    return Outcome::Busy;
                }
            }
            state = gate.wait_until(state, deadline);
        }
    }

    /// Run handlers posted by other threads until `deadline`; returns how
    /// many ran. Only the gate owner serves, any other caller just sleeps.
    pub fn serve_until(&self, deadline: Instant) -> usize {
        let context = self.context.read().ok().and_then(|slot| slot.clone());
        let Some(ctx) = context.filter(|c| c.gate.is_held_by_current_thread()) else {
            let wait = deadline.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
            return 0;
        };

        let gate = &ctx.gate;
        let mut served = 0;
        let mut state = lock(&gate.state);
        loop {
            if let Some(job) = state.job.as_mut().filter(|job| job.stage == Stage::Queued) {
                job.stage = Stage::Running;
                let (id, kind, channels) = (job.id, job.kind, job.channels);
                let mut samples = std::mem::take(&mut job.samples);
                drop(state);

                let outcome = self.run_handler(&ctx.lua, kind, &mut samples, channels);
                served += 1;

                state = lock(&gate.state);
                match state.job.as_ref().filter(|job| job.id == id).map(|job| job.stage) {
                    Some(Stage::Running) => {
                        if let Some(job) = state.job.as_mut() {
                            job.samples = samples;
                            job.stage = Stage::Done(outcome);
                        }
                    }
                    Some(_) => {
                        state.job = None;
                        state.spare = samples;
                    }
                    None => state.spare = samples,
                }
                gate.changed.notify_all();
                continue;
            }
            if Instant::now() >= deadline {
                return served;
            }
            state = gate.wait_until(state, deadline);
        }
    }

    /// Run whatever is posted right now without waiting.
    pub fn serve_pending(&self) -> usize {
        self.serve_until(Instant::now())
    }

    fn run_handler(&self, lua: &Lua, kind: CallbackKind, buffer: &mut [f32], channels: u32) -> Outcome {
        let name = self.global_name(kind);
        let handler = match lua.globals().get::<Value>(name) {
            Ok(Value::Function(f)) => f,
            _ => {
                self.missing.fetch_add(1, Ordering::Relaxed);
                self.report_failure(kind, &format!("global function '{name}' not defined"));
                return Outcome::Missing;
            }
        };

        self.invoked.fetch_add(1, Ordering::Relaxed);
        let frames = buffer.len() / channels.max(1) as usize;
        let result = panic::catch_unwind(AssertUnwindSafe(|| call_with_frame(&handler, buffer, frames)))
            .unwrap_or_else(|_| Err(mlua::Error::runtime("handler panicked")));
        match result {
            Ok(()) => Outcome::Called,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.report_failure(kind, &e.to_string());
                Outcome::Failed
            }
        }
    }

    /// First failure of a streak is a warning, the rest go to debug so a
    /// broken handler does not flood the log at audio rate.
    fn report_failure(&self, kind: CallbackKind, message: &str) {
        let streak = &self.failing[kind.index()];
        if streak.swap(1, Ordering::Relaxed) == 0 {
            log::warn!("[trampoline] {}: {message}", self.global_name(kind));
        } else {
            log::debug!("[trampoline] {}: {message}", self.global_name(kind));
        }
    }
}

/// Call `handler(buffer, frames)` with `buffer` published as the active
/// frame for `AudioBufferGet`/`AudioBufferSet`. The return value is
/// discarded.
fn call_with_frame(handler: &Function, buffer: &mut [f32], frames: usize) -> mlua::Result<()> {
    struct Restore(Option<(*mut f32, usize)>);
    impl Drop for Restore {
        fn drop(&mut self) {
            ACTIVE_FRAME.with(|f| f.set(self.0));
        }
    }

    let ptr = buffer.as_mut_ptr();
    let _restore = Restore(ACTIVE_FRAME.with(|f| f.replace(Some((ptr, buffer.len())))));
    handler.call::<()>((LightUserData(ptr as *mut c_void), frames))
}

/// Access to the buffer of the handler running on this thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAccessError {
    #[error("no audio buffer is active on this thread")]
    NoActiveBuffer,
    #[error("pointer does not match the active audio buffer")]
    ForeignBuffer,
    #[error("sample index {index} out of range (buffer holds {len} samples)")]
    OutOfRange { index: usize, len: usize },
}

fn with_active_frame<R>(
    ptr: *mut c_void,
    index: usize,
    f: impl FnOnce(&mut f32) -> R,
) -> Result<R, FrameAccessError> {
    let (active, len) = ACTIVE_FRAME.with(|c| c.get()).ok_or(FrameAccessError::NoActiveBuffer)?;
    if active as *mut c_void != ptr {
        return Err(FrameAccessError::ForeignBuffer);
    }
    if index >= len {
        return Err(FrameAccessError::OutOfRange { index, len });
    }
    // SAFETY: `active` points at the `len`-sample buffer borrowed mutably by
    // `call_with_frame` further up this thread's stack, and index < len.
    Ok(f(unsafe { &mut *active.add(index) }))
}

/// Read sample `index` (0-based, interleaved) of the active buffer.
pub fn read_sample(ptr: *mut c_void, index: usize) -> Result<f32, FrameAccessError> {
    with_active_frame(ptr, index, |s| *s)
}

/// Write sample `index` (0-based, interleaved) of the active buffer.
pub fn write_sample(ptr: *mut c_void, index: usize, value: f32) -> Result<(), FrameAccessError> {
    with_active_frame(ptr, index, |s| *s = value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(lua: &Lua) -> (Arc<Trampoline>, ScriptContext) {
        let t = Trampoline::new(CallbackNames::default());
        let ctx = ScriptContext { lua: lua.clone(), gate: ScriptGate::new() };
        t.bind(ctx.clone());
        (t, ctx)
    }

    fn install_setter(lua: &Lua) {
        lua.globals()
            .set(
                "set",
                lua.create_function(|_, (p, i, v): (LightUserData, usize, f32)| {
                    write_sample(p.0, i, v).map_err(mlua::Error::external)
                })
                .unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn unregistered_kind_is_not_called() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        let mut buf = [0.0f32; 4];
        assert_eq!(t.invoke(CallbackKind::StreamProcessor, &mut buf, 2), Outcome::Unbound);
        assert_eq!(t.stats(), TrampolineStats::default());
    }

    #[test]
    fn missing_handler_is_counted_not_fatal() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        t.register(CallbackKind::StreamProcessor);
        let mut buf = [0.25f32; 4];
        assert_eq!(t.invoke(CallbackKind::StreamProcessor, &mut buf, 2), Outcome::Missing);
        assert_eq!(t.invoke(CallbackKind::StreamProcessor, &mut buf, 2), Outcome::Missing);
        assert_eq!(buf, [0.25; 4]);
        assert_eq!(t.stats().missing, 2);
    }

    #[test]
    fn handler_receives_frames_and_edits_samples() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        install_setter(&lua);
        lua.load(
            r#"
            function AudioMixedProcessor(buffer, frames)
                seen_frames = frames
                for i = 0, frames * 2 - 1 do set(buffer, i, 1.0) end
            end
            "#,
        )
        .exec()
        .unwrap();
        t.register(CallbackKind::MixedProcessor);

        let mut buf = [0.0f32; 6];
        assert_eq!(t.invoke(CallbackKind::MixedProcessor, &mut buf, 2), Outcome::Called);
        assert_eq!(buf, [1.0; 6]);
        assert_eq!(lua.globals().get::<i64>("seen_frames").unwrap(), 3);
        assert_eq!(t.stats().invoked, 1);
    }

    #[test]
    fn script_error_is_contained() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        lua.load("function AudioStreamProcessor() error('boom') end").exec().unwrap();
        t.register(CallbackKind::StreamProcessor);
        let mut buf = [0.5f32; 2];
        assert_eq!(t.invoke(CallbackKind::StreamProcessor, &mut buf, 1), Outcome::Failed);
        assert_eq!(buf, [0.5; 2]);
        assert_eq!(t.stats().failed, 1);
    }

    #[test]
    fn owner_that_never_yields_makes_the_call_busy() {
        let lua = Lua::new();
        let (t, ctx) = bound(&lua);
        lua.load("function AudioStreamCallback() called = true end").exec().unwrap();
        t.register(CallbackKind::StreamCallback);

        let inside = ctx.gate.enter();
        let outcome = thread::scope(|s| {
            s.spawn(|| {
                let mut buf = [0.0f32; 2];
                t.invoke(CallbackKind::StreamCallback, &mut buf, 1)
            })
            .join()
            .unwrap()
        });
        drop(inside);
        assert_eq!(outcome, Outcome::Busy);
        assert_eq!(t.stats().busy, 1);
        assert!(lua.globals().get::<Option<bool>>("called").unwrap().is_none());
    }

    #[test]
    fn posted_call_runs_when_the_owner_yields() {
        let lua = Lua::new();
        let (t, ctx) = bound(&lua);
        install_setter(&lua);
        lua.load(
            r#"
            function AudioMixedProcessor(buffer, frames)
                hits = (hits or 0) + 1
                for i = 0, frames * 2 - 1 do set(buffer, i, 0.5) end
            end
            "#,
        )
        .exec()
        .unwrap();
        t.register(CallbackKind::MixedProcessor);

        let inside = ctx.gate.enter();
        let (outcome, buf, served) = thread::scope(|s| {
            let audio = s.spawn(|| {
                let mut buf = [0.0f32; 4];
                let outcome = t.invoke(CallbackKind::MixedProcessor, &mut buf, 2);
                (outcome, buf)
            });
            let mut served = 0;
            let give_up = Instant::now() + Duration::from_secs(2);
            while !audio.is_finished() && Instant::now() < give_up {
                served += t.serve_until(Instant::now() + Duration::from_millis(5));
            }
            let (outcome, buf) = audio.join().unwrap();
            (outcome, buf, served)
        });
        drop(inside);

        assert_eq!(outcome, Outcome::Called);
        assert_eq!(buf, [0.5; 4]);
        assert_eq!(served, 1);
        assert_eq!(lua.globals().get::<i64>("hits").unwrap(), 1);
        assert_eq!(t.stats().busy, 0);
    }

    #[test]
    fn serving_without_the_gate_only_waits() {
        let lua = Lua::new();
        let (t, ctx) = bound(&lua);
        assert!(!ctx.gate.is_held_by_current_thread());
        let started = Instant::now();
        assert_eq!(t.serve_until(started + Duration::from_millis(10)), 0);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn gate_is_reentrant_for_its_owner() {
        let gate = ScriptGate::new();
        let outer = gate.enter();
        {
            let _inner = gate.enter();
            assert!(gate.is_held_by_current_thread());
        }
        assert!(gate.is_held_by_current_thread());
        drop(outer);
        assert!(!gate.is_held_by_current_thread());
    }

    #[test]
    fn unbind_stops_dispatch() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        t.register(CallbackKind::StreamProcessor);
        t.unbind();
        assert!(!t.is_bound());
        let mut buf = [0.0f32; 2];
        assert_eq!(t.invoke(CallbackKind::StreamProcessor, &mut buf, 1), Outcome::Unbound);
    }

    #[test]
    fn frame_access_is_checked() {
        let mut buf = [0.5f32; 2];
        let ptr = buf.as_mut_ptr() as *mut c_void;
        assert_eq!(read_sample(ptr, 0), Err(FrameAccessError::NoActiveBuffer));

        ACTIVE_FRAME.with(|f| f.set(Some((buf.as_mut_ptr(), 2))));
        assert_eq!(read_sample(ptr, 1), Ok(0.5));
        assert_eq!(read_sample(ptr, 2), Err(FrameAccessError::OutOfRange { index: 2, len: 2 }));
        let other = 8usize as *mut c_void;
        assert_eq!(write_sample(other, 0, 1.0), Err(FrameAccessError::ForeignBuffer));
        ACTIVE_FRAME.with(|f| f.set(None));
    }

    #[test]
    fn callback_objects_forward_to_invoke() {
        let lua = Lua::new();
        let (t, _) = bound(&lua);
        lua.load("function AudioStreamProcessor() hits = (hits or 0) + 1 end").exec().unwrap();
        t.register(CallbackKind::StreamProcessor);
        let cb = t.callback(CallbackKind::StreamProcessor);
        let mut buf = [0.0f32; 4];
        cb(&mut buf, 2);
        cb(&mut buf, 2);
        assert_eq!(lua.globals().get::<i64>("hits").unwrap(), 2);
        t.unbind();
    }
}
