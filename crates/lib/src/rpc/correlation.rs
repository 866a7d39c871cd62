//! Pending `getAttachment` requests keyed by request id.
//!
//! Owned by the ingestion loop; entries are inserted when a request is written and
//! taken exactly once when the matching response arrives (or evicted by `expire`).

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Context needed to finish a fetch once its response arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub message_id: i64,
    pub attachment_id: String,
    pub issued_at: Instant,
}

/// Outstanding request ids -> pending attachment.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: HashMap<String, PendingAttachment>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Request id for an attachment: epoch millis followed by the attachment id.
    /// Appends `-1`, `-2`, ... while the id is still outstanding.
    pub fn next_request_id(&self, now_ms: i64, attachment_id: &str) -> String {
        let base = format!("{}{}", now_ms, attachment_id);
        if !self.pending.contains_key(&base) {
            return base;
        }
        (1u64..)
            .map(|n| format!("{}-{}", base, n))
            .find(|id| !self.pending.contains_key(id))
            .unwrap_or(base)
    }

    /// Register a request. Returns the entry it replaced, which callers treat as a bug.
    pub fn insert(
        &mut self,
        request_id: impl Into<String>,
        entry: PendingAttachment,
    ) -> Option<PendingAttachment> {
        self.pending.insert(request_id.into(), entry)
    }

    /// One-shot consumption: removes and returns the entry for `request_id`.
    pub fn take(&mut self, request_id: &str) -> Option<PendingAttachment> {
        self.pending.remove(request_id)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Evict every entry issued more than `ttl` before `now`. Returned sorted by issue time.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<(String, PendingAttachment)> {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.issued_at) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        let mut evicted: Vec<(String, PendingAttachment)> = stale
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p)))
            .collect();
        evicted.sort_by_key(|(_, p)| p.issued_at);
        evicted
    }

    /// Drop everything (shutdown). Returns how many were outstanding.
    pub fn clear(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}
