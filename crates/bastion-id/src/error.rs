pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors `bastion-id` can emit.
///
/// Generation itself is infallible once a generator exists; every variant
/// here is raised while building one.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The configured node id does not fit into the node partition bits.
    #[error("node id {node_id} exceeds the maximum of {max}")]
    NodeIdOutOfRange { node_id: u64, max: u64 },

    /// The system clock reads earlier than the requested epoch.
    #[error("system clock is earlier than the configured epoch")]
    ClockBeforeEpoch,

    /// The clock's ticker thread could not be spawned.
    #[error("failed to spawn clock thread: {0}")]
    ClockThread(String),
}
