use std::sync::Arc;

use wire::Header;

/// A cheap, `Clone`-able handle to a message buffer owned by the bus.
///
/// Modeled as an owned `Arc`-backed value rather than a bus-issued integer
/// token: the client moves these in and out of its own queue the same way
/// it would move any other owned value, and cloning just bumps a refcount.
#[derive(Debug, Clone)]
pub struct OwnedMessage {
    inner: Arc<Vec<u8>>,
}

impl OwnedMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self { inner: Arc::new(body) }
    }

    pub fn body(&self) -> &[u8] {
        &self.inner
    }
}

/// The client's transport collaborator. Owns message allocation, the
/// physical send path, and its own tick-driven bookkeeping; the client never
/// reaches past this trait to a concrete socket or allocator.
pub trait MessageBus {
    /// Acquires a free message buffer, or `None` if the bus has none
    /// available. Registration treats exhaustion here as fatal.
    fn get_message(&mut self) -> Option<OwnedMessage>;
    fn ref_message(&mut self, message: &OwnedMessage);
    fn unref_message(&mut self, message: OwnedMessage);
    fn send_header_to_replica(&mut self, replica: usize, header: &Header);
    fn send_message_to_replica(&mut self, replica: usize, message: &OwnedMessage);
    fn tick(&mut self);
}

/// Test doubles for [`MessageBus`], used by this crate's own tests and
/// available to integration tests in `tests/` the same way.
pub mod test_support {
    use std::collections::VecDeque;

    use wire::Header;

    use super::{MessageBus, OwnedMessage};

    /// A `MessageBus` double backed by per-replica queues of sent headers,
    /// for assembling end-to-end client tests without a real transport.
    pub struct MockBus {
        pub messages_free: usize,
        pub sent: Vec<VecDeque<Header>>,
        pub ticks: u64,
    }

    impl MockBus {
        pub fn new(replica_count: usize, messages_max: usize) -> Self {
            Self {
                messages_free: messages_max,
                sent: (0..replica_count).map(|_| VecDeque::new()).collect(),
                ticks: 0,
            }
        }

        pub fn sent_to(&self, replica: usize) -> &VecDeque<Header> {
            &self.sent[replica]
        }

        pub fn take_last_sent(&mut self, replica: usize) -> Option<Header> {
            self.sent[replica].pop_back()
        }
    }

    impl MessageBus for MockBus {
        fn get_message(&mut self) -> Option<OwnedMessage> {
            if self.messages_free == 0 {
                return None;
            }
            self.messages_free -= 1;
            Some(OwnedMessage::new(Vec::new()))
        }

        fn ref_message(&mut self, _message: &OwnedMessage) {}

        fn unref_message(&mut self, _message: OwnedMessage) {
            self.messages_free += 1;
        }

        fn send_header_to_replica(&mut self, replica: usize, header: &Header) {
            self.sent[replica].push_back(*header);
        }

        fn send_message_to_replica(&mut self, replica: usize, _message: &OwnedMessage) {
            let _ = replica;
        }

        fn tick(&mut self) {
            self.ticks += 1;
        }
    }
}
