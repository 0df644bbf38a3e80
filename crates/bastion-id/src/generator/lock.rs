use core::cmp::Ordering;
use parking_lot::Mutex;

use crate::{IdGenStatus, Snowflake, TimeSource};

/// A Snowflake generator whose state lives behind a mutex.
///
/// Every call takes the lock, compares the clock against the last issued
/// timestamp, and either bumps the sequence, rolls over to the new
/// millisecond, or reports [`IdGenStatus::Pending`]. Concurrent callers are
/// therefore fully serialized around the sequence counter, which is what
/// makes the IDs pairwise distinct under parallel load.
pub struct LockSnowflakeGenerator<ID, T>
where
    ID: Snowflake,
    T: TimeSource<u64>,
{
    state: Mutex<ID>,
    time: T,
}

impl<ID, T> LockSnowflakeGenerator<ID, T>
where
    ID: Snowflake,
    T: TimeSource<u64>,
{
    /// Creates a generator for `node_id` with the timestamp and sequence at
    /// zero.
    pub fn new(node_id: u64, time: T) -> Self {
        Self::from_components(0, node_id, 0, time)
    }

    /// Creates a generator from explicit component values, e.g. to resume
    /// after the last ID a previous generator issued.
    pub fn from_components(timestamp: u64, node_id: u64, sequence: u64, time: T) -> Self {
        Self {
            state: Mutex::new(ID::from_components(timestamp, node_id, sequence)),
            time,
        }
    }

    /// Attempts to produce the next ID without blocking.
    ///
    /// - `Ready { id }` when a new ID was issued.
    /// - `Pending { yield_for: 1 }` when the sequence is exhausted for the
    ///   current millisecond.
    /// - `Pending { yield_for: n }` when the clock reads `n` milliseconds
    ///   behind the last issued timestamp.
    pub fn next_id(&self) -> IdGenStatus<ID> {
        let now = self.time.current_millis();
        let mut last = self.state.lock();
        let last_ts = last.timestamp();

        match now.cmp(&last_ts) {
            Ordering::Equal => {
                if last.has_sequence_room() {
                    *last = last.increment_sequence();
                    IdGenStatus::Ready { id: *last }
                } else {
                    IdGenStatus::Pending { yield_for: 1 }
                }
            }
            Ordering::Greater => {
                *last = last.rollover_to_timestamp(now);
                IdGenStatus::Ready { id: *last }
            }
            Ordering::Less => Self::cold_clock_behind(now, last_ts),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last_ts: u64) -> IdGenStatus<ID> {
        tracing::debug!(now, last_ts, "clock behind last issued timestamp");
        IdGenStatus::Pending {
            yield_for: last_ts - now,
        }
    }
}
