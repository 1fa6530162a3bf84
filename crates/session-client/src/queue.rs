use std::collections::VecDeque;

use wire::Header;

use crate::bus::OwnedMessage;
use crate::error::ClientError;

/// Invoked once with the retired request's outcome: `Ok((operation, body))`
/// on a matching reply, or `Err` if the request was rejected before it was
/// ever enqueued (queue full).
pub type RequestCallback = Box<dyn FnOnce(u128, Result<(u8, Vec<u8>), ClientError>)>;

/// One outstanding request: its header (resent byte-identical on timeout),
/// the message buffer backing its body, the caller's opaque correlation
/// token, and the callback invoked once a matching reply lands.
pub struct QueuedRequest {
    pub user_data: u128,
    pub callback: RequestCallback,
    pub message: OwnedMessage,
    pub header: Header,
}

/// A bounded FIFO of outstanding requests. Capacity is
/// `message_bus_messages_max - 1`: one message slot is always reserved so
/// the bus can still allocate a buffer for whatever reply is in flight.
pub struct RequestQueue {
    items: VecDeque<QueuedRequest>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Pushes a request. Callers must check `is_full` first; this never
    /// rejects on its own since the full-queue callback path is the
    /// client's responsibility, not the queue's.
    pub fn push(&mut self, request: QueuedRequest) {
        self.items.push_back(request);
    }

    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        self.items.pop_front()
    }

    pub fn front(&self) -> Option<&QueuedRequest> {
        self.items.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut QueuedRequest> {
        self.items.front_mut()
    }
}
