// Debouncer for local document writes.
//
// Coalesces rapid local edits into a single pending backend write. Each
// new edit replaces the pending content and resets the timer; the write
// fires once the window elapses with no further edits.

use std::time::{Duration, Instant};

/// Default debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 1000;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 100;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 5000;

/// Configuration for the write debouncer.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Create a config with the given window in milliseconds, clamped to [100, 5000].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

/// The coalesced write waiting for its window to elapse.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub(crate) content: String,
    /// When the buffer first became dirty (survives coalescing).
    pub(crate) dirty_since: Instant,
    last_edit: Instant,
}

/// Debounces local edits into at most one pending backend write.
///
/// Call `record_edit()` on each local change, then `take_ready()`
/// periodically; it yields the coalesced content once the window has
/// elapsed since the last edit.
#[derive(Debug)]
pub struct WriteDebouncer {
    config: DebounceConfig,
    pending: Option<PendingWrite>,
}

impl WriteDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: None }
    }

    /// Record a local edit. An existing pending write is coalesced: the
    /// content is replaced, the timer resets, and the original
    /// dirty-since instant is kept.
    pub fn record_edit(&mut self, content: String) {
        self.record_edit_at(content, Instant::now());
    }

    /// Like `record_edit` but with a specific timestamp (for testing).
    pub(crate) fn record_edit_at(&mut self, content: String, now: Instant) {
        let dirty_since = self.pending.as_ref().map(|pending| pending.dirty_since).unwrap_or(now);
        self.pending = Some(PendingWrite { content, dirty_since, last_edit: now });
    }

    /// Take the pending write if its debounce window has elapsed.
    pub fn take_ready(&mut self) -> Option<String> {
        self.take_ready_at(Instant::now())
    }

    /// Like `take_ready` but with a specific timestamp (for testing).
    pub(crate) fn take_ready_at(&mut self, now: Instant) -> Option<String> {
        let elapsed = now.duration_since(self.pending.as_ref()?.last_edit);
        if elapsed >= self.config.window {
            self.pending.take().map(|pending| pending.content)
        } else {
            None
        }
    }

    /// Re-arm a write that failed to flush, keeping its dirty-since
    /// instant so conflict arbitration still sees the original edit time.
    /// A newer edit recorded meanwhile wins over the restored content.
    pub(crate) fn restore(&mut self, content: String, dirty_since: Instant) {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.dirty_since = pending.dirty_since.min(dirty_since);
            }
            None => {
                // last_edit in the past makes the retry ready on the
                // next caller-driven flush, never fired automatically.
                self.pending = Some(PendingWrite { content, dirty_since, last_edit: dirty_since });
            }
        }
    }

    /// Whether an unflushed local edit is pending.
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// When the buffer first became dirty, if it is.
    pub fn dirty_since(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.dirty_since)
    }

    /// Time at which the pending write becomes ready, or None if clean.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.last_edit + self.config.window)
    }

    /// Drop the pending write (session teardown). Returns true if one
    /// was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
