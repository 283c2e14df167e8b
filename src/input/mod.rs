//! Per-key touch state and key repeat
//!
//! An [`InputSurface`] owns the pressed flag and the repeat timer of one logical
//! key. It reports transitions to a [`TransitionSink`] and knows nothing about
//! where the resulting events end up.
//!
//! # Timing
//!
//! ```text
//! Begin ──► Press ──► Press ──► Press ──► ... ──► End ──► Release
//!           t=0       t=1·iv    t=2·iv                    (once)
//! ```
//!
//! The pressed check and every press emission happen under the key-state lock.
//! Release clears the flag under that same lock, so no press can follow its
//! release even if a tick races the deactivation.

pub mod pointer;

pub use pointer::{MousePhase, PointerEngagement, PointerInput, TouchPhase};

use crate::gamepad::keys::LogicalKey;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Key transition reported by a surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Press,
    Release,
}

/// Receiver of key transitions
///
/// Implementations must not panic and must not call back into the surface.
pub trait TransitionSink: Send + Sync {
    fn emit(&self, transition: Transition, key: &LogicalKey);
}

/// Visual pressed/idle feedback for the control behind a surface
pub type Feedback = Arc<dyn Fn(bool) + Send + Sync>;

struct RepeatTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RepeatTimer {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

#[derive(Default)]
struct KeyState {
    pressed: bool,
    repeat: Option<RepeatTimer>,
}

fn lock(state: &Mutex<KeyState>) -> MutexGuard<'_, KeyState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InputSurface {
    key: LogicalKey,
    state: Arc<Mutex<KeyState>>,
    sink: Arc<dyn TransitionSink>,
    feedback: Option<Feedback>,
    repeat_interval: Duration,
}

impl InputSurface {
    pub fn new(key: LogicalKey, sink: Arc<dyn TransitionSink>, repeat_interval: Duration) -> Self {
        Self {
            key,
            state: Arc::new(Mutex::new(KeyState::default())),
            sink,
            feedback: None,
            repeat_interval,
        }
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn key(&self) -> &LogicalKey {
        &self.key
    }

    pub fn is_pressed(&self) -> bool {
        lock(&self.state).pressed
    }

    pub fn has_repeat_timer(&self) -> bool {
        lock(&self.state).repeat.is_some()
    }

    /// Feeds raw pointer input; returns whether default handling is suppressed
    pub fn handle(&self, input: PointerInput) -> bool {
        if let Some(engagement) = input.engagement() {
            self.engage(engagement);
        }
        input.prevents_default()
    }

    pub fn engage(&self, engagement: PointerEngagement) {
        match engagement {
            PointerEngagement::Begin => self.activate(),
            PointerEngagement::MoveAway | PointerEngagement::End => self.deactivate(),
        }
    }

    /// Emits one press right away and keeps repeating it until deactivation
    pub fn activate(&self) {
        let mut state = lock(&self.state);
        if state.pressed {
            debug!("Key {} already pressed, ignoring activation", self.key);
            return;
        }

        state.pressed = true;
        self.apply_feedback(true);
        self.sink.emit(Transition::Press, &self.key);

        if let Some(stale) = state.repeat.take() {
            stale.stop();
        }
        state.repeat = self.spawn_repeat();
    }

    /// Emits exactly one release if the key was pressed
    pub fn deactivate(&self) {
        let mut state = lock(&self.state);
        if !state.pressed {
            return;
        }

        state.pressed = false;
        self.apply_feedback(false);
        if let Some(timer) = state.repeat.take() {
            timer.stop();
        }
        self.sink.emit(Transition::Release, &self.key);
    }

    /// Cancels the repeat timer and clears the pressed state without a release
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.repeat.take() {
            timer.stop();
        }
        if state.pressed {
            state.pressed = false;
            self.apply_feedback(false);
            debug!("Stopped held key {}", self.key);
        }
    }

    fn apply_feedback(&self, pressed: bool) {
        if let Some(feedback) = &self.feedback {
            feedback(pressed);
        }
    }

    fn spawn_repeat(&self) -> Option<RepeatTimer> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("No tokio runtime, key {} will not repeat: {}", self.key, e);
                return None;
            }
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let key = self.key.clone();
        let period = self.repeat_interval;
        let first_tick = Instant::now() + period;

        let task = runtime.spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = lock(&state);
                        // a tick that waited on the lock may belong to an earlier hold
                        if token.is_cancelled() || !current.pressed {
                            break;
                        }
                        sink.emit(Transition::Press, &key);
                    }
                }
            }
            debug!("Repeat timer for {} finished", key);
        });

        Some(RepeatTimer { cancel, task })
    }
}

impl Drop for InputSurface {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.state).repeat.take() {
            timer.stop();
        }
    }
}
