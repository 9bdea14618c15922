//! Cooperative pause/resume bridge between the engine execution thread and
//! an external debugger driver thread.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result};

/// Engine capability consumed on detach: force recompilation of compiled
/// functions so debug instrumentation is stripped.
pub trait DebugHost {
    fn recompile_all_functions(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugPhase {
    Detached,
    Attaching,
    Running,
    Paused,
    Detaching,
}

impl DebugPhase {
    fn name(self) -> &'static str {
        match self {
            Self::Detached => "Detached",
            Self::Attaching => "Attaching",
            Self::Running => "Attached(Running)",
            Self::Paused => "Attached(Paused)",
            Self::Detaching => "Detaching",
        }
    }
}

// Upper bound on how long the pause loop sleeps between re-checks of the
// resume flag, so a missed wakeup cannot park the engine thread forever.
const PAUSE_WAIT_INTERVAL: Duration = Duration::from_millis(50);

struct DebugShared {
    phase: DebugPhase,
    resume_pending: bool,
    instrumented: Vec<String>,
}

/// Attach/pause/resume/detach state machine.
///
/// The shared state sits behind one lock so the execution thread and the
/// driver thread observe consistent transitions; the pause loop blocks on
/// the condition variable instead of spinning.
pub struct DebuggerBridge {
    shared: Mutex<DebugShared>,
    resumed: Condvar,
}

impl DebuggerBridge {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(DebugShared {
                phase: DebugPhase::Detached,
                resume_pending: false,
                instrumented: Vec::new(),
            }),
            resumed: Condvar::new(),
        }
    }

    pub fn phase(&self) -> DebugPhase {
        self.shared.lock().phase
    }

    /// Register as the engine's active debug observer. Valid only from
    /// `Detached`.
    pub fn attach(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.phase != DebugPhase::Detached {
            return Err(Error::DebuggerTransition {
                from: shared.phase.name(),
                to: DebugPhase::Running.name(),
            });
        }
        shared.phase = DebugPhase::Attaching;
        shared.resume_pending = false;
        shared.phase = DebugPhase::Running;
        log::debug!("[debugger] attached");
        Ok(())
    }

    /// Engine-side: a function had breakpoint/step plumbing compiled in
    /// during this session.
    pub fn note_instrumented(&self, function: impl Into<String>) {
        let mut shared = self.shared.lock();
        if matches!(shared.phase, DebugPhase::Running | DebugPhase::Paused) {
            shared.instrumented.push(function.into());
        }
    }

    pub fn instrumented_functions(&self) -> Vec<String> {
        self.shared.lock().instrumented.clone()
    }

    /// Called by the execution thread on an engine pause notification
    /// (breakpoint, step). The caller must have released the engine's
    /// execution lock first so the driver thread can work on the paused
    /// engine. Blocks until `resume` or a detach, then settles back to
    /// `Running` if the session is still attached. No error path.
    pub fn run_pause_loop(&self) {
        let mut shared = self.shared.lock();
        if shared.phase != DebugPhase::Running {
            return;
        }
        shared.phase = DebugPhase::Paused;
        shared.resume_pending = false;
        log::debug!("[debugger] execution paused");
        while !shared.resume_pending {
            let _ = self.resumed.wait_for(&mut shared, PAUSE_WAIT_INTERVAL);
        }
        shared.resume_pending = false;
        if shared.phase == DebugPhase::Paused {
            shared.phase = DebugPhase::Running;
        }
        log::debug!("[debugger] execution resumed");
    }

    /// Driver-side: signal the paused execution thread to continue. The
    /// thread observes the flag within one wait interval. A resume while
    /// `Running` is a no-op.
    pub fn resume(&self) {
        let mut shared = self.shared.lock();
        if shared.phase != DebugPhase::Paused {
            return;
        }
        shared.resume_pending = true;
        self.resumed.notify_all();
    }

    /// Tear down the session from any attached state. Unless the engine
    /// itself is being destroyed, every function instrumented during the
    /// session is recompiled so no instrumentation leaks into a later
    /// attach.
    pub fn detach(&self, host: &mut dyn DebugHost, is_being_destroyed: bool) -> Result<()> {
        let stripped = {
            let mut shared = self.shared.lock();
            if !matches!(shared.phase, DebugPhase::Running | DebugPhase::Paused) {
                return Err(Error::DebuggerTransition {
                    from: shared.phase.name(),
                    to: DebugPhase::Detached.name(),
                });
            }
            // Unblock a paused execution thread; it observes `Detaching`
            // and does not settle back to Running.
            shared.phase = DebugPhase::Detaching;
            shared.resume_pending = true;
            self.resumed.notify_all();
            std::mem::take(&mut shared.instrumented)
        };

        // The host call runs outside the lock; it may call back into the
        // bridge.
        if !is_being_destroyed {
            log::debug!(
                "[debugger] recompiling {} instrumented functions",
                stripped.len()
            );
            host.recompile_all_functions();
        }

        self.shared.lock().phase = DebugPhase::Detached;
        log::debug!("[debugger] detached (is_being_destroyed={is_being_destroyed})");
        Ok(())
    }
}

impl Default for DebuggerBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct RecordingHost {
        recompiles: usize,
    }

    impl DebugHost for RecordingHost {
        fn recompile_all_functions(&mut self) {
            self.recompiles += 1;
        }
    }

    #[test]
    fn attach_twice_is_an_invalid_transition() {
        let bridge = DebuggerBridge::new();
        bridge.attach().unwrap();
        let error = bridge.attach().unwrap_err();
        assert!(matches!(error, Error::DebuggerTransition { .. }));
    }

    #[test]
    fn resume_while_running_is_a_no_op() {
        let bridge = DebuggerBridge::new();
        bridge.attach().unwrap();
        bridge.resume();
        assert_eq!(bridge.phase(), DebugPhase::Running);
    }

    #[test]
    fn pause_loop_blocks_until_resumed_from_another_thread() {
        let bridge = Arc::new(DebuggerBridge::new());
        bridge.attach().unwrap();

        let engine = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.run_pause_loop())
        };
        while bridge.phase() != DebugPhase::Paused {
            thread::yield_now();
        }
        bridge.resume();
        engine.join().unwrap();
        assert_eq!(bridge.phase(), DebugPhase::Running);
    }

    #[test]
    fn detach_strips_instrumentation_unless_engine_is_dying() {
        let mut host = RecordingHost::default();

        let bridge = DebuggerBridge::new();
        bridge.attach().unwrap();
        bridge.note_instrumented("main");
        bridge.note_instrumented("onTimer");
        bridge.detach(&mut host, false).unwrap();
        assert_eq!(host.recompiles, 1);
        assert_eq!(bridge.phase(), DebugPhase::Detached);

        // A fresh session observes no leftover instrumentation.
        bridge.attach().unwrap();
        assert!(bridge.instrumented_functions().is_empty());
        bridge.detach(&mut host, true).unwrap();
        assert_eq!(host.recompiles, 1);
    }

    #[test]
    fn detach_unblocks_a_paused_engine_thread() {
        let bridge = Arc::new(DebuggerBridge::new());
        bridge.attach().unwrap();

        let engine = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.run_pause_loop())
        };
        while bridge.phase() != DebugPhase::Paused {
            thread::yield_now();
        }
        let mut host = RecordingHost::default();
        bridge.detach(&mut host, false).unwrap();
        engine.join().unwrap();
        assert_eq!(bridge.phase(), DebugPhase::Detached);
    }

    #[test]
    fn note_instrumented_is_ignored_while_detached() {
        let bridge = DebuggerBridge::new();
        bridge.note_instrumented("main");
        assert!(bridge.instrumented_functions().is_empty());
    }
}
