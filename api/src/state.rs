use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kbeauty_mcp_runtime::Dispatcher;

/// Counts open SSE streams. Each stream holds a [`StreamGuard`] for its lifetime.
#[derive(Clone, Debug, Default)]
pub struct StreamGauge(Arc<AtomicUsize>);

impl StreamGauge {
    pub fn open(&self) -> StreamGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        StreamGuard(self.0.clone())
    }

    pub fn active(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub streams: StreamGauge,
    pub sse_heartbeat: Duration,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, sse_heartbeat: Duration) -> Self {
        Self {
            dispatcher,
            streams: StreamGauge::default(),
            sse_heartbeat,
        }
    }
}
