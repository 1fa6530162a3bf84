use thiserror::Error;

/// The only error the client ever surfaces synchronously to a caller; every
/// other failure mode (malformed reply, wrong cluster, stale reply) is
/// logged and dropped internally instead of propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request queue is full, no more than message_bus_messages_max - 1 requests may be outstanding")]
    TooManyOutstandingRequests,
}
