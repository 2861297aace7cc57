use parking_lot::Mutex;
use tracing::debug;

/// Receives navigation requests from session transitions.
pub trait Navigator: Send + Sync {
    fn push(&self, path: &str);
}

/// Records navigation requests in order.
#[derive(Debug, Default)]
pub struct NavigationLog {
    history: Mutex<Vec<String>>,
}

impl NavigationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.history.lock().last().cloned()
    }
}

impl Navigator for NavigationLog {
    fn push(&self, path: &str) {
        debug!(path, "Navigate");
        self.history.lock().push(path.to_string());
    }
}
