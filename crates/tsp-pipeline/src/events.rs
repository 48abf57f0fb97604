//! Plugin event signalling.

use std::sync::Arc;

use crate::plugin::BitrateConfidence;

/// Context passed synchronously to every registered handler when a plugin
/// calls `signal_event`.
#[derive(Clone, Debug)]
pub struct EventContext {
    /// Process-unique identifier from the owning pipeline's `UidGenerator`.
    pub event_id: u64,
    /// The plugin-chosen event code, carried verbatim from whatever the
    /// plugin passed to [`EventCell::signal`].
    pub code: u32,
    pub stage_name: String,
    pub stage_index: usize,
    pub stage_count: usize,
    pub bitrate: u64,
    pub bitrate_confidence: BitrateConfidence,
    pub local_packets: u64,
    pub global_packets: u64,
    /// The plugin-chosen payload, carried verbatim from whatever the
    /// plugin passed to [`EventCell::signal`].
    pub data: serde_json::Value,
}

/// A per-plugin accumulator a plugin pushes events into during
/// `process_packet`/`receive`/`send`; the executor drains it after every
/// pass and dispatches one [`EventContext`] per queued event.
///
/// This is what actually gives a plugin agency over the `code`/`data` a
/// handler receives: the executor itself never chooses either.
#[derive(Default)]
pub struct EventCell(Vec<(u32, serde_json::Value)>);

impl EventCell {
    /// Queues an event to be dispatched once the executor next drains this
    /// plugin's events (after the current packet pass completes).
    pub fn signal(&mut self, code: u32, data: serde_json::Value) {
        self.0.push((code, data));
    }

    /// Takes every queued event, leaving the cell empty.
    pub fn drain(&mut self) -> Vec<(u32, serde_json::Value)> {
        std::mem::take(&mut self.0)
    }
}

/// A handler for plugin-defined events.
///
/// Handlers run synchronously on the stage thread that raised the event
/// (handlers must not block significantly and must
/// not call back into the pipeline's control interfaces").
pub trait EventHandler: Send + Sync {
    fn handle(&self, ctx: &EventContext);
}

impl<F> EventHandler for F
where
    F: Fn(&EventContext) + Send + Sync,
{
    fn handle(&self, ctx: &EventContext) {
        (self)(ctx)
    }
}

/// A synchronous, append-only registry of event handlers.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventRegistry {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Invokes every registered handler in registration order.
    pub fn dispatch(&self, ctx: &EventContext) {
        for handler in self.handlers.iter() {
            handler.handle(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_invokes_all_handlers_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        let registry = EventRegistry::new(vec![
            Arc::new(move |_: &EventContext| {
                assert_eq!(c1.fetch_add(1, Ordering::SeqCst), 0);
            }),
            Arc::new(move |_: &EventContext| {
                assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 1);
            }),
        ]);
        registry.dispatch(&EventContext {
            event_id: 1,
            code: 1,
            stage_name: "x".into(),
            stage_index: 0,
            stage_count: 3,
            bitrate: 0,
            bitrate_confidence: BitrateConfidence::Undefined,
            local_packets: 0,
            global_packets: 0,
            data: serde_json::Value::Null,
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
