use crate::Snowflake;

/// Outcome of a single attempt to produce an ID.
///
/// - [`IdGenStatus::Ready`]: a new ID was produced.
/// - [`IdGenStatus::Pending`]: the sequence for the current millisecond is
///   exhausted (or the clock is behind the last issued timestamp). Retry after
///   `yield_for` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus<ID: Snowflake> {
    Ready { id: ID },
    Pending { yield_for: u64 },
}
