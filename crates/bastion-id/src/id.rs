use core::fmt;
use core::hash::Hash;

/// The component view of a 64-bit Snowflake identifier.
///
/// A layout decides how many bits each field gets; the generator only relies
/// on the accessors and helpers below.
pub trait Snowflake: Sized + Copy + fmt::Display + fmt::Debug + Ord + Hash {
    /// Returns the millisecond timestamp portion of the ID.
    fn timestamp(&self) -> u64;

    /// Returns the maximum value representable by the timestamp field.
    fn max_timestamp() -> u64;

    /// Returns the node partition portion of the ID.
    fn node_id(&self) -> u64;

    /// Returns the maximum value representable by the node field.
    fn max_node_id() -> u64;

    /// Returns the intra-millisecond sequence portion of the ID.
    fn sequence(&self) -> u64;

    /// Returns the maximum value representable by the sequence field.
    fn max_sequence() -> u64;

    /// Packs the three components into an ID. Out-of-range components are
    /// masked.
    fn from_components(timestamp: u64, node_id: u64, sequence: u64) -> Self;

    /// Returns the packed integer.
    fn to_raw(&self) -> u64;

    /// Rebuilds an ID from its packed integer.
    fn from_raw(raw: u64) -> Self;

    /// Returns true if the sequence can be incremented within this millisecond.
    fn has_sequence_room(&self) -> bool {
        self.sequence() < Self::max_sequence()
    }

    /// Returns the same timestamp and node with the next sequence value.
    fn increment_sequence(&self) -> Self {
        Self::from_components(self.timestamp(), self.node_id(), self.sequence() + 1)
    }

    /// Returns an ID for a newer millisecond with the sequence reset to zero.
    fn rollover_to_timestamp(&self, timestamp: u64) -> Self {
        Self::from_components(timestamp, self.node_id(), 0)
    }
}

/// The 64-bit identifier assigned to every persisted record.
///
/// - 1 bit reserved (always zero, so the value fits a signed `BIGINT`)
/// - 41 bits timestamp (ms since [`BASTION_EPOCH`])
/// - 10 bits node id
/// - 12 bits sequence
///
/// [`BASTION_EPOCH`]: crate::BASTION_EPOCH
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;
    pub const NODE_ID_MASK: u64 = (1 << 10) - 1;
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    pub const TIMESTAMP_SHIFT: u64 = 22;
    pub const NODE_ID_SHIFT: u64 = 12;

    pub const fn from(timestamp: u64, node_id: u64, sequence: u64) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let node_id = (node_id & Self::NODE_ID_MASK) << Self::NODE_ID_SHIFT;
        let sequence = sequence & Self::SEQUENCE_MASK;
        Self {
            id: timestamp | node_id | sequence,
        }
    }

    /// The value as a signed integer, for storage in `BIGINT` columns.
    ///
    /// Never negative since the top bit is reserved.
    pub const fn as_i64(&self) -> i64 {
        self.id as i64
    }
}

impl Snowflake for SnowflakeId {
    fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    fn max_timestamp() -> u64 {
        Self::TIMESTAMP_MASK
    }

    fn node_id(&self) -> u64 {
        (self.id >> Self::NODE_ID_SHIFT) & Self::NODE_ID_MASK
    }

    fn max_node_id() -> u64 {
        Self::NODE_ID_MASK
    }

    fn sequence(&self) -> u64 {
        self.id & Self::SEQUENCE_MASK
    }

    fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    fn from_components(timestamp: u64, node_id: u64, sequence: u64) -> Self {
        debug_assert!(timestamp <= Self::TIMESTAMP_MASK, "timestamp overflow");
        debug_assert!(node_id <= Self::NODE_ID_MASK, "node_id overflow");
        debug_assert!(sequence <= Self::SEQUENCE_MASK, "sequence overflow");
        Self::from(timestamp, node_id, sequence)
    }

    fn to_raw(&self) -> u64 {
        self.id
    }

    fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("node_id", &self.node_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}
