use std::collections::VecDeque;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use assoc_cache::{CacheAdapter, Layout, SetAssociativeCache};
use session_client::{Client, MessageBus, OwnedMessage};
use wire::{Command, Header, HEADER_SIZE, OPERATION_REGISTER};

/// Drives a session_client::Client against an in-process loopback bus and
/// caches recent reply summaries in a set-associative cache, as a manual
/// smoke test for both crates together.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 1)]
    cluster: u32,
    #[arg(long, default_value_t = 3)]
    replicas: usize,
    #[arg(long, default_value_t = 5)]
    requests: u32,
}

/// A summary of a settled reply, cached by request number purely to give
/// the demo something concrete to put through `assoc-cache`.
#[derive(Debug, Clone, Copy, Default)]
struct ReplySummary {
    request: u64,
    commit: u64,
}

struct ReplySummaryAdapter;

impl CacheAdapter<u64, ReplySummary> for ReplySummaryAdapter {
    fn hash(key: &u64) -> u64 {
        key.wrapping_mul(0x9E3779B97F4A7C15)
    }
    fn key_from_value(value: &ReplySummary) -> u64 {
        value.request
    }
    fn equal(a: &u64, b: &u64) -> bool {
        a == b
    }
}

/// A single-process stand-in for a replica cluster: every header sent to it
/// is answered immediately with a synthetic reply, so the demo can run the
/// client's full request lifecycle without a real transport.
struct LoopbackBus {
    messages_free: usize,
    inbox: VecDeque<(Header, Vec<u8>)>,
    next_session: u64,
}

impl LoopbackBus {
    fn new(messages_max: usize) -> Self {
        Self {
            messages_free: messages_max,
            inbox: VecDeque::new(),
            next_session: 0,
        }
    }

    fn reply_to(&mut self, header: &Header) -> (Header, Vec<u8>) {
        let commit = if header.operation == OPERATION_REGISTER {
            self.next_session += 1;
            self.next_session
        } else {
            header.request as u64 + 1_000
        };
        let body = format!("ack:{}", header.operation).into_bytes();

        let mut reply = Header::zeroed();
        reply.client = header.client;
        reply.parent = header.checksum;
        reply.cluster = header.cluster;
        reply.request = header.request;
        reply.view = header.view;
        reply.op = commit;
        reply.commit = commit;
        reply.command = Command::Reply;
        reply.operation = header.operation;
        reply.size = (HEADER_SIZE + body.len()) as u32;
        reply.set_checksums(&body);
        (reply, body)
    }
}

impl MessageBus for LoopbackBus {
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

    fn send_header_to_replica(&mut self, _replica: usize, header: &Header) {
        let reply = self.reply_to(header);
        self.inbox.push_back(reply);
    }

    fn send_message_to_replica(&mut self, _replica: usize, _message: &OwnedMessage) {}

    fn tick(&mut self) {}
}

fn drain(
    bus: &mut LoopbackBus,
    client: &mut Client,
    cache: &mut SetAssociativeCache<u64, ReplySummary, ReplySummaryAdapter>,
) {
    while let Some((header, body)) = bus.inbox.pop_front() {
        if header.command == Command::Reply {
            cache.put(ReplySummary {
                request: header.request as u64,
                commit: header.commit,
            });
        }
        client.on_message(bus, &header, &body);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut bus = LoopbackBus::new(32);
    let mut client = Client::new(args.cluster, args.replicas, 32);

    let mut cache = SetAssociativeCache::<u64, ReplySummary, ReplySummaryAdapter>::init(
        Layout {
            ways: 4,
            tag_bits: 16,
            clock_bits: 2,
            cache_line_size: 64,
        },
        16,
    )?;

    client.register(&mut bus);
    drain(&mut bus, &mut client, &mut cache);
    info!(session = client.session(), "registered");

    for i in 0..args.requests {
        let body = format!("op-{i}").into_bytes();
        let message = OwnedMessage::new(body.clone());
        client.request(
            &mut bus,
            i as u128,
            Box::new(move |user_data, result| match result {
                Ok((operation, reply_body)) => {
                    info!(
                        user_data,
                        operation,
                        body = %String::from_utf8_lossy(&reply_body),
                        "request completed"
                    );
                }
                Err(err) => warn!(user_data, %err, "request rejected"),
            }),
            1,
            message,
            &body,
        );
        drain(&mut bus, &mut client, &mut cache);
    }

    println!(
        "client {} registered with session {}",
        client.client_id(),
        client.session()
    );
    println!(
        "cache holds up to {} entries across {} sets",
        cache.capacity(),
        cache.sets()
    );
    Ok(())
}
