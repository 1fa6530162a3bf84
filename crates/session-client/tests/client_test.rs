use session_client::test_support::MockBus;
use session_client::{Client, OwnedMessage, REQUEST_TIMEOUT_INITIAL_TICKS};
use wire::{Command, Header, HEADER_SIZE};

fn reply_to(request_header: Header, commit: u64, body: &[u8]) -> Header {
    let mut reply = Header::zeroed();
    reply.client = request_header.client;
    reply.parent = request_header.checksum;
    reply.cluster = request_header.cluster;
    reply.request = request_header.request;
    reply.view = request_header.view;
    reply.op = commit;
    reply.commit = commit;
    reply.command = Command::Reply;
    reply.operation = request_header.operation;
    reply.size = (HEADER_SIZE + body.len()) as u32;
    reply.set_checksums(body);
    reply
}

/// A fresh client registers, gets its registration reply, then a normal
/// request round-trips through the callback with the reply body.
#[test]
fn register_then_request_round_trips() {
    let mut bus = MockBus::new(3, 8);
    let mut client = Client::new(1, 3, 8);

    client.register(&mut bus);
    let reg = bus.take_last_sent(client.view() as usize % 3).unwrap();
    let reg_reply = reply_to(reg, 100, &[]);
    client.on_message(&mut bus, &reg_reply, &[]);
    assert_eq!(client.session(), 100);

    let outcome = std::rc::Rc::new(std::cell::RefCell::new(None));
    let outcome2 = outcome.clone();
    client.request(
        &mut bus,
        7,
        Box::new(move |user_data, result| *outcome2.borrow_mut() = Some((user_data, result))),
        5,
        OwnedMessage::new(b"ping".to_vec()),
        b"ping",
    );

    let sent = bus.take_last_sent(client.view() as usize % 3).unwrap();
    assert_eq!(sent.operation, 5);
    let reply = reply_to(sent, 100, b"pong");
    client.on_message(&mut bus, &reply, b"pong");

    let (user_data, result) = outcome.borrow_mut().take().unwrap();
    assert_eq!(user_data, 7);
    let (operation, body) = result.unwrap();
    assert_eq!(operation, 5);
    assert_eq!(body, b"pong");
}

/// A reply that never arrives causes request_timeout to fire repeatedly,
/// rotating through replicas by attempt count, until one finally answers.
#[test]
fn timeout_rotates_through_replicas_until_answered() {
    let mut bus = MockBus::new(4, 8);
    let mut client = Client::new(2, 4, 8);

    client.register(&mut bus);
    let reg = bus.take_last_sent(0).unwrap();
    client.on_message(&mut bus, &reply_to(reg, 1, &[]), &[]);

    client.request(
        &mut bus,
        1,
        Box::new(|_, _| {}),
        1,
        OwnedMessage::new(Vec::new()),
        &[],
    );
    let first = bus.take_last_sent(0).unwrap();

    for _ in 0..=REQUEST_TIMEOUT_INITIAL_TICKS {
        client.tick(&mut bus);
    }
    let resent = bus
        .take_last_sent(1)
        .expect("request_timeout should resend to the next replica in view order");
    assert_eq!(resent.checksum, first.checksum);
    assert_eq!(resent.parent, first.parent);

    let reply = reply_to(resent, 1, &[]);
    client.on_message(&mut bus, &reply, &[]);
    assert!(client.is_registered());
}

/// A duplicate reply for an already-retired request is dropped rather than
/// reprocessed or asserted on.
#[test]
fn late_duplicate_reply_is_dropped_not_reprocessed() {
    let mut bus = MockBus::new(3, 8);
    let mut client = Client::new(3, 3, 8);

    client.register(&mut bus);
    let reg = bus.take_last_sent(0).unwrap();
    let reg_reply = reply_to(reg, 9, &[]);
    client.on_message(&mut bus, &reg_reply, &[]);
    assert_eq!(client.session(), 9);

    // A second copy of the same registration reply must not panic or
    // mutate client state; there is no outstanding request to match it.
    client.on_message(&mut bus, &reg_reply, &[]);
    assert_eq!(client.session(), 9);
}

/// A pong broadcast at a higher view makes the client adopt that view and
/// retry registration against the new leader.
#[test]
fn pong_adopts_higher_view() {
    let mut bus = MockBus::new(5, 8);
    let mut client = Client::new(4, 5, 8);
    assert_eq!(client.view(), 0);

    let mut pong = Header::zeroed();
    pong.client = 0;
    pong.cluster = 4;
    pong.view = 2;
    pong.command = Command::Pong;
    pong.size = HEADER_SIZE as u32;
    pong.set_checksums(&[]);

    client.on_message(&mut bus, &pong, &[]);
    assert_eq!(client.view(), 2);
}
