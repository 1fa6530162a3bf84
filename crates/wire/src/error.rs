use thiserror::Error;

/// Errors surfaced by header construction and validation.
///
/// Header validation itself returns plain `bool` on the hot path (a
/// malformed inbound message is logged and dropped by the caller, not
/// threaded through a `Result`); this type exists for the fallible
/// constructors that build a header from caller-supplied sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("body size {0} would overflow the header's size field")]
    BodyTooLarge(usize),
}
