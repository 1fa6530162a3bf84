use crate::command::Command;

/// Fixed, self-describing encoded size of a [`Header`], in bytes.
///
/// This crate never serializes a header onto a byte buffer itself (the
/// `MessageBus` collaborator owns the physical wire representation); the
/// constant exists so callers can size message buffers consistently:
/// `checksum(16) + checksum_body(16) + parent(16) + client(16) + context(8)
/// + request(4) + cluster(4) + view(4) + op(8) + commit(8) + size(4) +
/// command(1) + operation(1)`, rounded up to a multiple of 16 the way a
/// real header would be laid out for alignment.
pub const HEADER_SIZE: usize = 112;

/// A replicated-state-machine message header.
///
/// In-memory representation of a message header; the session client reads
/// and writes these directly. `checksum` and `checksum_body` are populated
/// by [`Header::set_checksums`] and hold no meaning before that call —
/// callers must not inspect them on a header that hasn't been sent yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub checksum: u128,
    pub checksum_body: u128,
    pub parent: u128,
    pub client: u128,
    pub context: u64,
    pub request: u32,
    pub cluster: u32,
    pub view: u32,
    pub op: u64,
    pub commit: u64,
    pub size: u32,
    pub command: Command,
    pub operation: u8,
}

impl Header {
    /// A header with every field zeroed and `command = Request`. Callers
    /// overwrite fields before use; this only exists to avoid an `Option`
    /// dance at construction sites that fill in fields incrementally.
    pub fn zeroed() -> Self {
        Self {
            checksum: 0,
            checksum_body: 0,
            parent: 0,
            client: 0,
            context: 0,
            request: 0,
            cluster: 0,
            view: 0,
            op: 0,
            commit: 0,
            size: 0,
            command: Command::Request,
            operation: 0,
        }
    }

    /// BLAKE3 hash of `body`, truncated to the low 128 bits.
    ///
    /// An empty body still hashes to a fixed, non-zero value (BLAKE3 of the
    /// empty string) — zero is never a valid checksum, only the sentinel
    /// initial `parent` before any request has been sent.
    pub fn checksum_body_of(body: &[u8]) -> u128 {
        truncate_to_u128(blake3::hash(body).as_bytes())
    }

    /// Bytes hashed to produce [`Header::checksum_header`]: every field
    /// except `checksum` itself, in declaration order, little-endian.
    fn bytes_for_header_checksum(&self) -> [u8; 88] {
        let mut buf = [0u8; 88];
        let mut at = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let b = $bytes;
                buf[at..at + b.len()].copy_from_slice(&b);
                at += b.len();
            }};
        }
        put!(self.checksum_body.to_le_bytes());
        put!(self.parent.to_le_bytes());
        put!(self.client.to_le_bytes());
        put!(self.context.to_le_bytes());
        put!(self.request.to_le_bytes());
        put!(self.cluster.to_le_bytes());
        put!(self.view.to_le_bytes());
        put!(self.op.to_le_bytes());
        put!(self.commit.to_le_bytes());
        put!(self.size.to_le_bytes());
        put!([self.command as u8]);
        put!([self.operation]);
        debug_assert_eq!(at, buf.len());
        buf
    }

    /// BLAKE3 hash over every field but `checksum`, truncated to 128 bits.
    pub fn checksum_header(&self) -> u128 {
        truncate_to_u128(blake3::hash(&self.bytes_for_header_checksum()).as_bytes())
    }

    /// Sets `checksum_body` then `checksum`, in that order — the header
    /// checksum commits to the body checksum, so body must be hashed first.
    pub fn set_checksums(&mut self, body: &[u8]) {
        self.checksum_body = Self::checksum_body_of(body);
        self.checksum = self.checksum_header();
    }

    pub fn valid_checksum(&self) -> bool {
        self.checksum == self.checksum_header()
    }

    pub fn valid_body(&self, body: &[u8]) -> bool {
        self.checksum_body == Self::checksum_body_of(body)
    }

    pub fn valid_size(&self, body_len: usize) -> bool {
        self.size as usize == HEADER_SIZE + body_len
    }
}

fn truncate_to_u128(hash: &[u8; 32]) -> u128 {
    let mut low = [0u8; 16];
    low.copy_from_slice(&hash[..16]);
    u128::from_le_bytes(low)
}
