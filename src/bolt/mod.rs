//! # Bolt Protocol Implementation
//!
//! Wire level of the driver: everything needed to talk to one server over
//! one byte stream, with no notion of pools, routing or retries.
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`codec`] - Chunked message framing for Tokio
//! - [`handshake`] - Version negotiation
//! - [`message`] - Bolt message types (HELLO, RUN, PULL, etc.)
//! - [`protocol`] - Per-version capability table and message sequencing
//! - [`error`] - Protocol error types
//!
//! Most users should use the high-level [`crate::driver`] module instead of
//! interacting with the Bolt protocol directly.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod protocol;

pub use codec::BoltCodec;
pub use error::{BoltError, BoltErrorCode, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, VersionProposal, BOLT_MAGIC};
pub use message::{
    AccessMode, AuthToken, BoltRequest, BoltResponse, FailureMessage, Notification,
    NotificationFilter, NotificationMinimumSeverity, QueryPlan, QueryStats, RecordMessage,
    SuccessMessage, TransactionExtra,
};
pub use packstream::{PackStreamError, PackStreamMap, PackStreamStructure, PackStreamValue};
pub use protocol::{BoltProtocol, Capabilities, Outgoing, RouteStyle};
