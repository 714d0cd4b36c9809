pub mod adapter;
pub mod codec;
pub mod command;
pub mod connection;
pub mod frame;
pub mod parser;
pub mod request;

use std::sync::Arc;

use thiserror::Error as ThisError;

pub use adapter::{
    Adapter, AdapterError, Collect, FromSimple, Ignore, Mapping, Opt, Pipeline, Scalar, Seq,
    SetOf, Transaction,
};
pub use command::Command;
pub use connection::Connection;
pub use frame::{AggregateLen, DataType, Frame};
pub use parser::{ParseError, Parser, MAX_NESTING_DEPTH};
pub use request::Request;

/// Everything that can go wrong on a connection, partitioned by origin:
/// transport, protocol, per-response adapter failures, and client-side
/// conditions.
///
/// The type is cheap to clone so a single fatal error can fail every
/// pending completion with the same code.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("connection closed before a full frame arrived")]
    UnexpectedEof,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("not connected")]
    NotConnected,
    #[error("operation aborted")]
    OperationAborted,
    #[error("connection is already running")]
    AlreadyRunning,
    #[error("response arrived with no pending request")]
    UnsolicitedResponse,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
