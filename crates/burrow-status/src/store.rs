//! Shared status value.

use std::sync::{Mutex, PoisonError};

/// Status reported before anything has been posted.
pub const INITIAL_STATUS: &str = "OK";

/// The current status string, shared between connections.
#[derive(Debug)]
pub struct StatusStore {
    current: Mutex<String>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(INITIAL_STATUS)
    }
}

impl StatusStore {
    /// Creates a store holding `initial`.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(initial.into()),
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn get(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current status.
    pub fn set(&self, status: impl Into<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = status.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_ok() {
        assert_eq!(StatusStore::default().get(), "OK");
    }

    #[test]
    fn set_replaces_value() {
        let store = StatusStore::default();
        store.set("degraded");
        assert_eq!(store.get(), "degraded");
    }

    #[test]
    fn concurrent_writers_leave_one_value() {
        let store = std::sync::Arc::new(StatusStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || store.set(format!("writer-{i}")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.get().starts_with("writer-"));
    }
}
