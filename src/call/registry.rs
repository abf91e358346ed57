//! Registry of active calls
//!
//! Keyed by telephony stream id. Entries are inserted after the stream
//! handshake completes and removed on teardown; the health endpoint reads
//! the count and shutdown cancels every call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Handle to one live call
#[derive(Debug, Clone)]
pub struct CallHandle {
    pub call_sid: String,
    pub started_at: DateTime<Utc>,
    /// Cancelling this token tears the call down
    pub cancel: CancellationToken,
}

/// Shared registry of in-flight calls
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    calls: Arc<RwLock<HashMap<String, CallHandle>>>,
}

impl CallRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, stream_sid: String, call_sid: String, cancel: CancellationToken) {
        let handle = CallHandle {
            call_sid,
            started_at: Utc::now(),
            cancel,
        };
        if let Some(previous) = self.calls.write().await.insert(stream_sid, handle) {
            // A stale entry under the same stream id means the old call
            // never cleaned up; end it
            previous.cancel.cancel();
        }
    }

    pub async fn remove(&self, stream_sid: &str) -> Option<CallHandle> {
        self.calls.write().await.remove(stream_sid)
    }

    pub async fn active_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn get(&self, stream_sid: &str) -> Option<CallHandle> {
        self.calls.read().await.get(stream_sid).cloned()
    }

    /// Cancel every active call; used on graceful shutdown
    pub async fn shutdown_all(&self) {
        let calls = self.calls.read().await;
        for handle in calls.values() {
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_remove_track_count() {
        let registry = CallRegistry::new();
        assert_eq!(registry.active_count().await, 0);

        registry
            .insert("MZ1".to_string(), "CA1".to_string(), CancellationToken::new())
            .await;
        registry
            .insert("MZ2".to_string(), "CA2".to_string(), CancellationToken::new())
            .await;
        assert_eq!(registry.active_count().await, 2);

        let removed = registry.remove("MZ1").await;
        assert_eq!(removed.unwrap().call_sid, "CA1");
        assert_eq!(registry.active_count().await, 1);
        assert!(registry.remove("MZ1").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_stream_id_cancels_stale_call() {
        let registry = CallRegistry::new();
        let stale = CancellationToken::new();
        registry
            .insert("MZ1".to_string(), "CA1".to_string(), stale.clone())
            .await;
        registry
            .insert("MZ1".to_string(), "CA2".to_string(), CancellationToken::new())
            .await;

        assert!(stale.is_cancelled());
        assert_eq!(registry.active_count().await, 1);
        assert_eq!(registry.get("MZ1").await.unwrap().call_sid, "CA2");
    }

    #[tokio::test]
    async fn shutdown_cancels_every_call() {
        let registry = CallRegistry::new();
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        registry
            .insert("MZ1".to_string(), "CA1".to_string(), a.clone())
            .await;
        registry
            .insert("MZ2".to_string(), "CA2".to_string(), b.clone())
            .await;

        registry.shutdown_all().await;
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
