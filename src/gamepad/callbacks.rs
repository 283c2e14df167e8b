//! Lifecycle observers

use color_eyre::Result;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use tracing::{debug, error, warn};

/// Events a session announces to external code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Fired after teardown completes, before registrations are cleared
    Unbind,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Unbind => "unbind",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unbind" => Ok(LifecycleEvent::Unbind),
            other => Err(format!("unknown lifecycle event '{}'", other)),
        }
    }
}

pub type Callback = Box<dyn FnMut() -> Result<()> + Send>;

/// Opaque handle identifying a registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Default)]
pub struct CallbackRegistry {
    next_id: u64,
    callbacks: HashMap<LifecycleEvent, Vec<(CallbackId, Callback)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the observers of `event`
    pub fn on<F>(&mut self, event: LifecycleEvent, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.register(event, Box::new(callback));
        self
    }

    /// Like [`on`](Self::on) but returns a handle for [`off`](Self::off)
    pub fn subscribe<F>(&mut self, event: LifecycleEvent, callback: F) -> CallbackId
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.register(event, Box::new(callback))
    }

    /// Removes one registration; false if it is unknown or already cleared
    pub fn off(&mut self, id: CallbackId) -> bool {
        for (event, callbacks) in self.callbacks.iter_mut() {
            if let Some(index) = callbacks.iter().position(|(known, _)| *known == id) {
                callbacks.remove(index);
                debug!("Removed callback {:?} for '{}'", id, event);
                return true;
            }
        }
        false
    }

    /// Registers by event name; unknown names are rejected with a warning
    pub fn on_named<F>(&mut self, name: &str, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        match name.parse::<LifecycleEvent>() {
            Ok(event) => {
                self.register(event, Box::new(callback));
            }
            Err(e) => warn!("Ignoring callback registration: {}", e),
        }
        self
    }

    fn register(&mut self, event: LifecycleEvent, callback: Callback) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.callbacks.entry(event).or_default().push((id, callback));
        debug!("Registered callback {:?} for '{}'", id, event);
        id
    }

    /// Invokes every callback for `event` in registration order
    ///
    /// Each invocation is isolated: errors and panics are logged and the
    /// remaining callbacks still run. Returns the number of failed callbacks.
    pub fn trigger(&mut self, event: LifecycleEvent) -> usize {
        let Some(callbacks) = self.callbacks.get_mut(&event) else {
            return 0;
        };

        let mut failures = 0;
        for (id, callback) in callbacks.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!("Callback {:?} for '{}' failed: {}", id, event, e);
                }
                Err(_) => {
                    failures += 1;
                    error!("Callback {:?} for '{}' panicked", id, event);
                }
            }
        }
        failures
    }

    pub fn len(&self, event: LifecycleEvent) -> usize {
        self.callbacks.get(&event).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .callbacks
            .iter()
            .map(|(event, callbacks)| (*event, callbacks.len()))
            .collect();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &counts)
            .finish()
    }
}
