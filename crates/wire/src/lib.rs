//! Wire-level message header, checksums, and command dispatch.
//!
//! This crate has no opinion about how a [`Header`] is framed onto bytes on
//! an actual socket; that is the `MessageBus` collaborator's job, kept
//! external per the protocol's scope. What lives here is the field layout,
//! the checksum algorithm that hash-chains a session together, and the
//! tagged `Command` enum the session client dispatches on.

mod command;
mod error;
mod header;

pub use command::{Command, OPERATION_REGISTER};
pub use error::HeaderError;
pub use header::{Header, HEADER_SIZE};
