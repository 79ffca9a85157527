//! Bolt connections for the driver.
//!
//! ```text
//! Driver
//!   └── ConnectionPool
//!         └── Connection
//!               ├── Transport (TCP or injected)
//!               ├── BoltCodec (chunked framing)
//!               ├── BoltProtocol (version-specific message building)
//!               └── FIFO of ResponseHandle senders
//! ```
//!
//! Wire types come from [`crate::bolt`]; this module adds the stateful
//! connection and the seams used to open it.

pub mod connection;
pub mod observer;
pub mod transport;

pub use connection::{Connection, ConnectionSettings, ConnectionState};
pub use observer::{ResponseEvent, ResponseHandle};
pub use transport::{BoxedTransport, Connector, DnsResolver, Resolver, TcpConnector, Transport};
