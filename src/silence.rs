//! Per-target notification mutes
//!
//! Silencing is strictly a *delivery* filter: alert records and target
//! status keep moving while a target is silenced, so a silenced target
//! still closes its own record when it recovers.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

/// Concurrent map of target id → mute expiry. Entries expire lazily on read.
#[derive(Default)]
pub struct SilenceTable {
    entries: DashMap<i64, DateTime<Utc>>,
}

impl SilenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute a target for `duration` from now. Re-silencing keeps the later
    /// of the existing and the new expiry, so a shorter re-silence never
    /// truncates an active mute. Returns the effective expiry.
    pub fn silence(&self, target_id: i64, duration: Duration) -> DateTime<Utc> {
        let proposed = Utc::now() + duration;
        let mut entry = self.entries.entry(target_id).or_insert(proposed);
        if proposed > *entry {
            *entry = proposed;
        }
        let effective = *entry;
        drop(entry);

        debug!(target_id, %effective, "target silenced");
        effective
    }

    /// Whether the target is currently muted. Stale entries are removed.
    pub fn is_silenced(&self, target_id: i64) -> bool {
        if let Some(entry) = self.entries.get(&target_id) {
            if Utc::now() < *entry {
                return true;
            }
        }
        self.entries
            .remove_if(&target_id, |_, expiry| Utc::now() >= *expiry);
        false
    }

    /// Drop the mute for a target, if any.
    pub fn clear(&self, target_id: i64) {
        self.entries.remove(&target_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_mutes_until_expiry() {
        let table = SilenceTable::new();
        assert!(!table.is_silenced(1));

        table.silence(1, Duration::minutes(10));
        assert!(table.is_silenced(1));
        assert!(!table.is_silenced(2));
    }

    #[test]
    fn expired_entries_are_lazily_removed() {
        let table = SilenceTable::new();
        table.silence(1, Duration::milliseconds(-1));
        assert!(!table.is_silenced(1));
    }

    #[test]
    fn shorter_resilence_never_truncates() {
        let table = SilenceTable::new();
        let long = table.silence(1, Duration::minutes(30));
        let effective = table.silence(1, Duration::minutes(5));
        assert_eq!(effective, long);

        let extended = table.silence(1, Duration::minutes(60));
        assert!(extended > long);
    }

    #[test]
    fn clear_unmutes() {
        let table = SilenceTable::new();
        table.silence(1, Duration::minutes(30));
        table.clear(1);
        assert!(!table.is_silenced(1));
    }
}
