//! Identifier sequence.
//!
//! Generates unique, monotonically increasing ids in the
//! `prefix_timestamp_sequence` format. The sequence counter is atomic, so a
//! single generator can be shared across services.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Thread-safe id generator.
pub struct IdGenerator {
    current: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at zero
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// Create a generator continuing from a known sequence value
    pub fn starting_at(initial: u64) -> Self {
        Self {
            current: AtomicU64::new(initial),
        }
    }

    /// Produce the next id for the given prefix.
    ///
    /// Format: `prefix_timestampmicros-hex_sequence-hex`, e.g.
    /// `grant_0005f2b8c91a3d40_0000002a`.
    pub fn next_id(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let seq = self.current.fetch_add(1, Ordering::SeqCst);
        format!(
            "{}_{:016x}_{:08x}",
            prefix,
            now.timestamp_micros() as u64,
            seq
        )
    }

    /// Current sequence value without incrementing
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the sequence number from an id in the generator's format.
pub fn extract_sequence_from_id(id: &str) -> Option<u64> {
    let parts: Vec<&str> = id.split('_').collect();
    if parts.len() >= 3 {
        u64::from_str_radix(parts.last()?, 16).ok()
    } else {
        None
    }
}

/// Maximum sequence among a list of ids, for resuming after restart.
pub fn max_sequence_from_ids<S: AsRef<str>>(ids: &[S]) -> u64 {
    ids.iter()
        .filter_map(|id| extract_sequence_from_id(id.as_ref()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_id_format_and_monotonicity() {
        let generator = IdGenerator::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let a = generator.next_id("grant", now);
        let b = generator.next_id("grant", now);
        assert!(a.starts_with("grant_"));
        assert_ne!(a, b);
        assert_eq!(extract_sequence_from_id(&a), Some(0));
        assert_eq!(extract_sequence_from_id(&b), Some(1));
    }

    #[test]
    fn test_extract_sequence_from_id() {
        assert_eq!(
            extract_sequence_from_id("permit_0000018d00001234_00000001"),
            Some(1)
        );
        assert_eq!(
            extract_sequence_from_id("grant_0000018d00005678_000000ff"),
            Some(255)
        );
        assert_eq!(extract_sequence_from_id("invalid"), None);
    }

    #[test]
    fn test_max_sequence_from_ids() {
        let ids = [
            "grant_0000018d00001234_00000001",
            "grant_0000018d00001235_00000005",
            "grant_0000018d00001236_00000003",
        ];
        assert_eq!(max_sequence_from_ids(&ids), 5);
    }

    #[test]
    fn test_starting_at_resumes() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let generator = IdGenerator::starting_at(100);
        let id = generator.next_id("worker", now);
        assert_eq!(extract_sequence_from_id(&id), Some(100));
    }
}
