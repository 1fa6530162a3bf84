use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

use wire::{Command, Header, HEADER_SIZE, OPERATION_REGISTER};

use crate::bus::{MessageBus, OwnedMessage};
use crate::error::ClientError;
use crate::queue::{QueuedRequest, RequestCallback, RequestQueue};
use crate::timer::Timer;

/// 30 seconds' worth of ticks at the bus's assumed 100ms tick period.
pub const PING_TIMEOUT_TICKS: u64 = 300;
/// Initial request_timeout duration, before any backoff.
pub const REQUEST_TIMEOUT_INITIAL_TICKS: u64 = 10;
/// Upper bound a backed-off request_timeout never exceeds.
pub const REQUEST_TIMEOUT_MAX_TICKS: u64 = 3_000;

/// Drives one client's session against a cluster of replicas: registration,
/// the hash-chained request/reply sequence, and retransmission on timeout.
///
/// Every tick is supplied by the caller via [`Client::tick`] — there is no
/// wall-clock dependency, so tests drive the state machine with a plain
/// counter instead of sleeping.
pub struct Client {
    client_id: u128,
    cluster_id: u32,
    replica_count: usize,
    ticks: u64,
    parent: u128,
    session: u64,
    request_number: u32,
    view: u32,
    request_queue: RequestQueue,
    request_timeout: Timer,
    ping_timeout: Timer,
    prng: StdRng,
}

impl Client {
    /// `messages_max` is the bus's total message-buffer count; the request
    /// queue reserves one slot so a reply can always be allocated a buffer.
    pub fn new(cluster_id: u32, replica_count: usize, messages_max: usize) -> Self {
        assert!(replica_count > 0, "a client needs at least one replica");
        assert!(messages_max > 1, "messages_max must allow an outstanding request");

        let client_id = loop {
            let candidate: u128 = OsRng.gen();
            if candidate != 0 {
                break candidate;
            }
        };

        let mut ping_timeout = Timer::new(PING_TIMEOUT_TICKS);
        ping_timeout.start(0);

        Self {
            client_id,
            cluster_id,
            replica_count,
            ticks: 0,
            parent: 0,
            session: 0,
            request_number: 0,
            view: 0,
            request_queue: RequestQueue::new(messages_max - 1),
            request_timeout: Timer::new(REQUEST_TIMEOUT_INITIAL_TICKS),
            ping_timeout,
            prng: StdRng::seed_from_u64(client_id as u64),
        }
    }

    pub fn client_id(&self) -> u128 {
        self.client_id
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn view(&self) -> u32 {
        self.view
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_registered(&self) -> bool {
        self.session > 0
    }

    fn replica_for(&self, offset: u64) -> usize {
        ((self.view as u64 + offset) % self.replica_count as u64) as usize
    }

    /// Issues a session-registration request if one hasn't already been
    /// attempted. A no-op on every call after the first.
    pub fn register(&mut self, bus: &mut impl MessageBus) {
        if self.request_number > 0 {
            return;
        }

        let message = bus
            .get_message()
            .expect("message bus exhausted acquiring a buffer for registration");

        let mut header = Header::zeroed();
        header.client = self.client_id;
        header.request = self.request_number;
        header.cluster = self.cluster_id;
        header.command = Command::Request;
        header.operation = OPERATION_REGISTER;
        header.size = HEADER_SIZE as u32;
        self.request_number += 1;

        bus.ref_message(&message);
        let was_empty = self.request_queue.is_empty();
        self.request_queue.push(QueuedRequest {
            user_data: 0,
            callback: Box::new(|_, _| {}),
            message,
            header,
        });
        if was_empty {
            self.first_send(bus);
        }
    }

    /// Submits a user request, triggering registration first if needed.
    /// `message` must already hold `body`'s bytes; `body` is used directly
    /// for checksumming so callers don't pay to re-read it out of the
    /// message handle on the hot path.
    pub fn request(
        &mut self,
        bus: &mut impl MessageBus,
        user_data: u128,
        callback: RequestCallback,
        operation: u8,
        message: OwnedMessage,
        body: &[u8],
    ) {
        self.register(bus);

        if self.request_queue.is_full() {
            callback(user_data, Err(ClientError::TooManyOutstandingRequests));
            return;
        }

        let mut header = Header::zeroed();
        header.client = self.client_id;
        header.request = self.request_number;
        header.cluster = self.cluster_id;
        header.command = Command::Request;
        header.operation = operation;
        header.size = (HEADER_SIZE + body.len()) as u32;
        self.request_number += 1;

        bus.ref_message(&message);
        let was_empty = self.request_queue.is_empty();
        self.request_queue.push(QueuedRequest {
            user_data,
            callback,
            message,
            header,
        });
        if was_empty {
            self.first_send(bus);
        }
    }

    /// Finalizes the head request's header (parent/context/view, then
    /// checksums) and sends it for the first time.
    fn first_send(&mut self, bus: &mut impl MessageBus) {
        let view = self.view;
        let parent = self.parent;
        let req = self
            .request_queue
            .front_mut()
            .expect("first_send called on an empty queue");

        req.header.parent = parent;
        req.header.context = self.session;
        req.header.view = view;
        req.header.set_checksums(req.message.body());

        self.parent = req.header.checksum;
        let replica = self.replica_for(0);

        self.request_timeout = Timer::new(REQUEST_TIMEOUT_INITIAL_TICKS);
        self.request_timeout.start(self.ticks);

        let req = self.request_queue.front().expect("just pushed");
        bus.send_header_to_replica(replica, &req.header);
        bus.send_message_to_replica(replica, &req.message);
    }

    /// Validates and dispatches an inbound message. Anything malformed or
    /// addressed to a different cluster is logged and dropped.
    pub fn on_message(&mut self, bus: &mut impl MessageBus, header: &Header, body: &[u8]) {
        if !header.valid_checksum() || !header.valid_body(body) || !header.valid_size(body.len()) {
            tracing::warn!(command = ?header.command, "dropping message with invalid checksum or size");
            return;
        }
        if header.cluster != self.cluster_id {
            tracing::warn!(cluster = header.cluster, "dropping message for a different cluster");
            return;
        }

        match header.command {
            Command::Pong => self.on_pong(bus, header),
            Command::Reply => self.on_reply(bus, header, body),
            other => tracing::warn!(command = ?other, "ignoring message with unexpected command"),
        }
    }

    fn on_pong(&mut self, bus: &mut impl MessageBus, header: &Header) {
        if header.client != 0 {
            tracing::debug!("ignoring a client-targeted pong");
            return;
        }
        if header.view > self.view {
            self.view = header.view;
        }
        self.register(bus);
    }

    fn on_reply(&mut self, bus: &mut impl MessageBus, header: &Header, body: &[u8]) {
        assert!(header.valid_checksum(), "reply checksum must be valid");
        assert!(header.valid_body(body), "reply body must match checksum_body");

        if header.client != self.client_id {
            tracing::debug!("ignoring a reply addressed to a different client");
            return;
        }

        let head_request = match self.request_queue.front() {
            Some(head) => head.header.request,
            None => {
                tracing::debug!("ignoring a reply with no outstanding request");
                return;
            }
        };
        if header.request < head_request {
            tracing::debug!(
                request = header.request,
                head = head_request,
                "dropping a stale reply"
            );
            return;
        }

        let queued = self
            .request_queue
            .pop_front()
            .expect("queue checked non-empty above");

        assert_eq!(header.parent, self.parent, "reply parent must chain from the last sent checksum");
        assert_eq!(header.cluster, self.cluster_id, "reply cluster must match");
        assert_eq!(header.request, queued.header.request, "reply must answer the head request");
        assert_eq!(header.operation, queued.header.operation, "reply operation must match the request");
        assert_eq!(header.op, header.commit, "a reply's op and commit must agree");
        assert_eq!(header.context, 0, "reply context must be zero");

        self.parent = header.checksum;
        if header.view > self.view {
            self.view = header.view;
        }
        self.request_timeout.stop();
        bus.unref_message(queued.message);

        if queued.header.operation == OPERATION_REGISTER {
            assert!(header.commit > 0, "registration must assign a nonzero session number");
            self.session = header.commit;
        } else {
            (queued.callback)(queued.user_data, Ok((header.operation, body.to_vec())));
        }

        if !self.request_queue.is_empty() {
            self.first_send(bus);
        }
    }

    fn on_ping_timeout(&mut self, bus: &mut impl MessageBus) {
        self.ping_timeout.start(self.ticks);
        let mut ping = Header::zeroed();
        ping.client = self.client_id;
        ping.cluster = self.cluster_id;
        ping.command = Command::Ping;
        ping.size = HEADER_SIZE as u32;
        for replica in 0..self.replica_count {
            bus.send_header_to_replica(replica, &ping);
        }
    }

    fn on_request_timeout(&mut self, bus: &mut impl MessageBus) {
        let ticks = self.ticks;
        self.request_timeout
            .backoff(ticks, REQUEST_TIMEOUT_MAX_TICKS, &mut self.prng);
        let replica = self.replica_for(self.request_timeout.attempts as u64);

        let req = self
            .request_queue
            .front()
            .expect("request_timeout fired with an empty queue");
        bus.send_header_to_replica(replica, &req.header);
        bus.send_message_to_replica(replica, &req.message);
    }

    /// Advances the client's tick counter, firing any elapsed timers, then
    /// ticks the bus.
    pub fn tick(&mut self, bus: &mut impl MessageBus) {
        self.ticks += 1;
        if self.ping_timeout.fired(self.ticks) {
            self.on_ping_timeout(bus);
        }
        if self.request_timeout.fired(self.ticks) {
            self.on_request_timeout(bus);
        }
        bus.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::test_support::MockBus;
    use crate::bus::OwnedMessage;

    fn registered(bus: &mut MockBus) -> Client {
        let mut client = Client::new(7, 3, 8);
        client.register(bus);
        let reply = reply_to(bus.take_last_sent(client.view() as usize % 3).unwrap(), 0, 5);
        client.on_message(bus, &reply, &[]);
        client
    }

    fn reply_to(request_header: Header, op_override: u8, commit: u64) -> Header {
        let mut reply = Header::zeroed();
        reply.client = request_header.client;
        reply.parent = request_header.checksum;
        reply.cluster = request_header.cluster;
        reply.request = request_header.request;
        reply.view = request_header.view;
        reply.op = commit;
        reply.commit = commit;
        reply.command = Command::Reply;
        reply.operation = if op_override == 0 { request_header.operation } else { op_override };
        reply.size = HEADER_SIZE as u32;
        reply.set_checksums(&[]);
        reply
    }

    #[test]
    fn register_sends_a_request_to_replica_zero() {
        let mut bus = MockBus::new(3, 8);
        let mut client = Client::new(1, 3, 8);
        client.register(&mut bus);
        assert_eq!(bus.sent_to(0).len(), 1);
        assert_eq!(bus.sent_to(0)[0].operation, OPERATION_REGISTER);
    }

    #[test]
    fn register_is_idempotent() {
        let mut bus = MockBus::new(3, 8);
        let mut client = Client::new(1, 3, 8);
        client.register(&mut bus);
        client.register(&mut bus);
        assert_eq!(bus.sent_to(0).len(), 1);
    }

    #[test]
    fn registration_reply_sets_session_without_invoking_a_callback() {
        let mut bus = MockBus::new(3, 8);
        let mut client = registered(&mut bus);
        assert!(client.is_registered());
        assert_eq!(client.session(), 5);
    }

    #[test]
    fn request_after_registration_invokes_callback_on_reply() {
        let mut bus = MockBus::new(3, 8);
        let mut client = registered(&mut bus);

        let got = std::rc::Rc::new(std::cell::RefCell::new(None));
        let got2 = got.clone();
        client.request(
            &mut bus,
            42,
            Box::new(move |user_data, result| {
                *got2.borrow_mut() = Some((user_data, result));
            }),
            9,
            OwnedMessage::new(b"hello".to_vec()),
            b"hello",
        );

        let sent = bus.take_last_sent(client.view() as usize % 3).unwrap();
        assert_eq!(sent.operation, 9);
        let reply = reply_to(sent, 9, 5);
        client.on_message(&mut bus, &reply, b"world");

        let (user_data, result) = got.borrow_mut().take().unwrap();
        assert_eq!(user_data, 42);
        let (operation, body) = result.unwrap();
        assert_eq!(operation, 9);
        assert_eq!(body, b"world");
    }

    #[test]
    fn request_timeout_resends_to_the_next_replica_in_view_order() {
        let mut bus = MockBus::new(3, 8);
        let mut client = registered(&mut bus);

        client.request(
            &mut bus,
            1,
            Box::new(|_, _| {}),
            3,
            OwnedMessage::new(Vec::new()),
            &[],
        );
        let first_replica = client.view() as usize % 3;
        let first = bus.take_last_sent(first_replica).unwrap();

        for _ in 0..=REQUEST_TIMEOUT_INITIAL_TICKS {
            client.tick(&mut bus);
        }

        let second_replica = (client.view() as usize + 1) % 3;
        let resent = bus.take_last_sent(second_replica).unwrap();
        assert_eq!(resent.checksum, first.checksum);
        assert_eq!(resent.parent, first.parent);
    }

    #[test]
    fn queue_rejects_requests_past_capacity() {
        let mut bus = MockBus::new(3, 2);
        let mut client = registered(&mut bus);

        let rejected = std::rc::Rc::new(std::cell::RefCell::new(false));
        let rejected2 = rejected.clone();
        client.request(
            &mut bus,
            1,
            Box::new(|_, _| {}),
            1,
            OwnedMessage::new(Vec::new()),
            &[],
        );
        client.request(
            &mut bus,
            2,
            Box::new(move |_, result| {
                *rejected2.borrow_mut() = result.is_err();
            }),
            2,
            OwnedMessage::new(Vec::new()),
            &[],
        );
        assert!(*rejected.borrow());
    }

    #[test]
    fn ping_timeout_broadcasts_to_every_replica() {
        let mut bus = MockBus::new(3, 8);
        let mut client = Client::new(1, 3, 8);
        for _ in 0..=PING_TIMEOUT_TICKS {
            client.tick(&mut bus);
        }
        for replica in 0..3 {
            assert!(bus.sent_to(replica).iter().any(|h| h.command == Command::Ping));
        }
    }
}
