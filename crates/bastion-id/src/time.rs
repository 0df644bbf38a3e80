use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};
use std::{
    sync::Arc,
    thread,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use crate::{Error, Result};

/// Wednesday, January 1, 2020 00:00:00 UTC
pub const BASTION_EPOCH: Duration = Duration::from_millis(1_577_836_800_000);

/// A source of millisecond timestamps relative to some origin.
///
/// Generators are generic over this so tests can drive the clock by hand.
pub trait TimeSource<T> {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> T;
}

struct Ticker {
    elapsed: AtomicU64,
}

/// A clock that never goes backwards.
///
/// At construction the wall clock is read once to compute the offset between
/// `epoch` and now. From then on a background thread publishes the elapsed
/// monotonic milliseconds into an atomic, so reads are a single load and are
/// unaffected by NTP steps or manual clock changes.
///
/// The ticker thread exits once every clone of the clock has been dropped.
#[derive(Clone)]
pub struct MonotonicClock {
    ticker: Arc<Ticker>,
    epoch_offset: u64,
}

impl MonotonicClock {
    /// Builds a clock anchored at [`BASTION_EPOCH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockBeforeEpoch`] if the system clock reads earlier
    /// than the epoch.
    pub fn new() -> Result<Self> {
        Self::with_epoch(BASTION_EPOCH)
    }

    /// Builds a clock whose zero point is `epoch` (a duration since the Unix
    /// epoch).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockBeforeEpoch`] if the system clock reads earlier
    /// than `epoch`, or [`Error::ClockThread`] if the ticker thread cannot be
    /// spawned.
    pub fn with_epoch(epoch: Duration) -> Result<Self> {
        let epoch_offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|now| now.checked_sub(epoch))
            .ok_or(Error::ClockBeforeEpoch)?
            .as_millis() as u64;

        let ticker = Arc::new(Ticker {
            elapsed: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&ticker);
        thread::Builder::new()
            .name("bastion-id-clock".into())
            .spawn(move || {
                let start = Instant::now();
                let mut next_tick = 0;
                loop {
                    let Some(ticker) = weak.upgrade() else {
                        break;
                    };

                    let target = start + Duration::from_millis(next_tick);
                    let now = Instant::now();
                    if now < target {
                        thread::sleep(target - now);
                    }

                    let elapsed = start.elapsed().as_millis() as u64;
                    ticker.elapsed.store(elapsed, Ordering::Release);
                    next_tick = elapsed + 1;
                }
            })
            .map_err(|err| Error::ClockThread(err.to_string()))?;

        Ok(Self {
            ticker,
            epoch_offset,
        })
    }
}

impl TimeSource<u64> for MonotonicClock {
    fn current_millis(&self) -> u64 {
        self.epoch_offset + self.ticker.elapsed.load(Ordering::Acquire)
    }
}

/// Reads the wall clock on every call.
///
/// Cheap to build and thread-free, but follows clock steps backwards; the
/// generator then reports `Pending` until the clock catches up.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Duration,
}

impl SystemClock {
    pub const fn with_epoch(epoch: Duration) -> Self {
        Self { epoch }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::with_epoch(BASTION_EPOCH)
    }
}

impl TimeSource<u64> for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|now| now.checked_sub(self.epoch))
            .map_or(0, |since| since.as_millis() as u64)
    }
}

/// The clock an [`IdGenerator`](crate::IdGenerator) reads its timestamps from.
#[derive(Clone)]
pub enum Clock {
    Monotonic(MonotonicClock),
    System(SystemClock),
}

impl TimeSource<u64> for Clock {
    fn current_millis(&self) -> u64 {
        match self {
            Self::Monotonic(clock) => clock.current_millis(),
            Self::System(clock) => clock.current_millis(),
        }
    }
}

impl From<MonotonicClock> for Clock {
    fn from(clock: MonotonicClock) -> Self {
        Self::Monotonic(clock)
    }
}

impl From<SystemClock> for Clock {
    fn from(clock: SystemClock) -> Self {
        Self::System(clock)
    }
}
