use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use parking_lot::Mutex;

use crate::mailing_list_client::TagId;

/// Source of "now" for cache expiry; swapped out in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

#[derive(Debug, Clone, Copy)]
struct CachedTag {
    id: TagId,
    cached_at: DateTime<Utc>,
}

/// In-memory tag name -> tag id map with a fixed time-to-live.
///
/// There is no background sweeper: every `get` first drops *all* expired
/// entries, then looks up the requested name. Names are matched exactly
/// (case-sensitive), as the provider returns them.
///
/// One instance is shared by every request of a running application; the lock
/// is only ever held for plain map operations, never across an `.await`.
pub struct TagCache {
    entries: Mutex<HashMap<String, CachedTag>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TagCache {
    pub fn new(ttl: Duration) -> Self { Self::with_clock(ttl, Arc::new(SystemClock)) }

    pub fn with_clock(
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn get(
        &self,
        tag_name: &str,
    ) -> Option<TagId> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| now - entry.cached_at <= self.ttl);
        entries.get(tag_name).map(|entry| entry.id)
    }

    /// Insert or overwrite; the entry's age restarts from now.
    pub fn insert(
        &self,
        tag_name: &str,
        id: TagId,
    ) {
        let cached_at = self.clock.now();
        self.entries
            .lock()
            .insert(tag_name.to_string(), CachedTag { id, cached_at });
    }

    /// Bulk version of `insert`, used to warm the cache from a full tag listing.
    pub fn extend(
        &self,
        tags: impl IntoIterator<Item = (String, TagId)>,
    ) {
        let cached_at = self.clock.now();
        let mut entries = self.entries.lock();
        for (name, id) in tags {
            entries.insert(name, CachedTag { id, cached_at });
        }
    }

    /// Number of entries, expired or not.
    #[cfg(test)]
    pub fn len(&self) -> usize { self.entries.lock().len() }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self { Self(Mutex::new(Utc::now())) }

    pub fn advance(
        &self,
        by: Duration,
    ) {
        let mut now = self.0.lock();
        *now = *now + by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { *self.0.lock() }
}
