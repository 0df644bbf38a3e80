use core::time::Duration;

use crate::{
    Clock, Error, IdGenStatus, LockSnowflakeGenerator, MonotonicClock, Result, Snowflake,
    SnowflakeId,
};

/// The ID generator shared by every create operation of one process.
///
/// The node id is fixed at construction. [`IdGenerator::generate`] blocks the
/// calling thread until an ID is available: when the sequence is exhausted it
/// sleeps until the next millisecond instead of wrapping around. Async callers
/// use [`IdGenerator::generate_async`] (feature `async-tokio`), which parks the
/// task on a tokio timer instead of the worker thread.
pub struct IdGenerator {
    node_id: u64,
    inner: LockSnowflakeGenerator<SnowflakeId, Clock>,
}

impl IdGenerator {
    /// Builds a generator for `node_id` on a fresh [`MonotonicClock`].
    ///
    /// # Errors
    ///
    /// - [`Error::NodeIdOutOfRange`] if `node_id` does not fit the node bits.
    /// - Any error raised while starting the clock.
    pub fn new(node_id: u64) -> Result<Self> {
        Self::with_clock(node_id, MonotonicClock::new()?)
    }

    /// Builds a generator for `node_id` on an existing clock, either a
    /// [`MonotonicClock`] or a [`SystemClock`](crate::SystemClock).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeIdOutOfRange`] if `node_id` does not fit the node
    /// bits.
    pub fn with_clock(node_id: u64, clock: impl Into<Clock>) -> Result<Self> {
        let max = SnowflakeId::max_node_id();
        if node_id > max {
            return Err(Error::NodeIdOutOfRange { node_id, max });
        }
        tracing::debug!(node_id, "id generator ready");
        Ok(Self {
            node_id,
            inner: LockSnowflakeGenerator::new(node_id, clock.into()),
        })
    }

    pub const fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Returns the next ID, waiting for the clock when necessary.
    pub fn generate(&self) -> SnowflakeId {
        loop {
            match self.inner.next_id() {
                IdGenStatus::Ready { id } => break id,
                IdGenStatus::Pending { yield_for } => {
                    std::thread::sleep(Duration::from_millis(yield_for));
                }
            }
        }
    }

    /// Returns the next ID, awaiting a tokio timer while the sequence for the
    /// current millisecond is exhausted.
    #[cfg(feature = "async-tokio")]
    pub async fn generate_async(&self) -> SnowflakeId {
        loop {
            match self.inner.next_id() {
                IdGenStatus::Ready { id } => break id,
                IdGenStatus::Pending { yield_for } => {
                    tokio::time::sleep(Duration::from_millis(yield_for)).await;
                }
            }
        }
    }
}
