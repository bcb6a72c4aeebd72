//! Post id generator
//!
//! Ids are the hex concatenation `machine | timestamp | counter`:
//!
//! | Part      | Hex digits | Source                                     |
//! |-----------|------------|--------------------------------------------|
//! | machine   | up to 4    | configured `machine-id`                    |
//! | timestamp | 10         | low 40 bits of the Unix time in ms         |
//! | counter   | 1          | sequence within one millisecond            |
//!
//! The result is masked to 63 bits so it is a positive `i64`. When more
//! than 16 ids are requested within one millisecond the generator borrows
//! the next millisecond, so ids stay distinct and increasing.

use parking_lot::Mutex;
use tracing::trace;
use trellis_core::{Error, Result};

use crate::model::PostType;

const TIMESTAMP_BITS: u32 = 40;
const COUNTER_BITS: u32 = 4;
const COUNTER_MAX: i64 = (1 << COUNTER_BITS) - 1;
const TIMESTAMP_MASK: i64 = (1 << TIMESTAMP_BITS) - 1;

#[derive(Debug)]
struct Clock {
    timestamp: i64,
    counter: i64,
}

/// Generates unique, increasing 63-bit ids
#[derive(Debug)]
pub struct UniqueIdService {
    machine: i64,
    clock: Mutex<Clock>,
}

impl UniqueIdService {
    /// Generator for `machine_id` (up to 4 hex digits)
    pub fn new(machine_id: &str) -> Result<Self> {
        if machine_id.is_empty()
            || machine_id.len() > 4
            || !machine_id.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::invalid_argument(format!(
                "machine id {:?} must be 1 to 4 hex digits",
                machine_id
            )));
        }
        let machine = i64::from_str_radix(machine_id, 16).map_err(|e| {
            Error::invalid_argument(format!("machine id {:?}: {}", machine_id, e))
        })?;
        Ok(UniqueIdService {
            machine,
            clock: Mutex::new(Clock {
                timestamp: -1,
                counter: 0,
            }),
        })
    }

    /// Allocate the next id
    pub fn compose_unique_id(&self, post_type: PostType) -> i64 {
        let id = self.next_id(chrono::Utc::now().timestamp_millis());
        trace!(target: "trellis::services", id, ?post_type, "Composed unique id");
        id
    }

    pub(crate) fn next_id(&self, now_ms: i64) -> i64 {
        let (timestamp, counter) = {
            let mut clock = self.clock.lock();
            if now_ms > clock.timestamp {
                clock.timestamp = now_ms;
                clock.counter = 0;
            } else if clock.counter < COUNTER_MAX {
                clock.counter += 1;
            } else {
                clock.timestamp += 1;
                clock.counter = 0;
            }
            (clock.timestamp, clock.counter)
        };
        let id = (self.machine << (TIMESTAMP_BITS + COUNTER_BITS))
            | ((timestamp & TIMESTAMP_MASK) << COUNTER_BITS)
            | counter;
        id & i64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_layout_matches_hex_concatenation() {
        let ids = UniqueIdService::new("1f").unwrap();
        let now = 0x01_9a2b_3c4d_i64;
        let id = ids.next_id(now);
        let expected = i64::from_str_radix(&format!("1f{:010x}0", now), 16).unwrap();
        assert_eq!(id, expected);
    }

    #[test]
    fn test_same_millisecond_ids_differ() {
        let ids = UniqueIdService::new("0").unwrap();
        let a = ids.next_id(1_000);
        let b = ids.next_id(1_000);
        assert_ne!(a, b);
        assert!(b > a);
        assert!(a > 0);
    }

    #[test]
    fn test_counter_overflow_borrows_next_millisecond() {
        let ids = UniqueIdService::new("0").unwrap();
        let mut seen = HashSet::new();
        let mut last = 0;
        for _ in 0..100 {
            let id = ids.next_id(5_000);
            assert!(id > last);
            assert!(seen.insert(id));
            last = id;
        }
        // A clock that catches up does not reuse borrowed milliseconds
        let next = ids.next_id(5_001);
        assert!(next > last);
    }

    #[test]
    fn test_clock_going_backwards_stays_monotonic() {
        let ids = UniqueIdService::new("a").unwrap();
        let a = ids.next_id(9_000);
        let b = ids.next_id(8_000);
        assert!(b > a);
    }

    #[test]
    fn test_invalid_machine_id() {
        assert!(UniqueIdService::new("").is_err());
        assert!(UniqueIdService::new("zz").is_err());
        assert!(UniqueIdService::new("12345").is_err());
        assert!(UniqueIdService::new("-1").is_err());
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(UniqueIdService::new("3").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| ids.compose_unique_id(PostType::Post))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 2000);
    }
}
