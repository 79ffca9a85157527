//! # bolt-driver
//!
//! An async Rust client for graph databases speaking the Bolt protocol
//! (versions 3.0, 4.0 to 4.4 and 5.0 to 5.4).
//!
//! ## Features
//!
//! - **Bolt 3 to 5.4** - PackStream codec, chunked framing, version negotiation and a per-version capability table
//! - **Async/Await** - Built on Tokio; every physical connection handles its responses strictly in order
//! - **Connection Pooling** - Per-address pools with lifetime, idle and acquisition limits
//! - **Cluster Routing** - `neo4j://` URIs keep per-database routing tables and send reads and writes to the right members
//! - **Causal Consistency** - Sessions chain transactions with bookmarks
//! - **Retries** - Transaction functions are retried on transient errors with exponential backoff and jitter
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bolt_driver::{params, AuthToken, Driver, QueryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new("neo4j://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//!
//!     let result = driver
//!         .execute_query(
//!             "MATCH (p:Person) WHERE p.age > $age RETURN p.name AS name",
//!             Some(params! { "age" => 30i64 }),
//!             QueryConfig::new().with_readers(),
//!         )
//!         .await?;
//!     for record in result.records {
//!         println!("{:?}", record.get("name"));
//!     }
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Sessions and Transactions
//!
//! ```rust,no_run
//! # use bolt_driver::{AuthToken, Driver, SessionConfig};
//! use futures::FutureExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("u", "p"))?;
//! let session = driver.session(SessionConfig::builder().with_database("movies").build())?;
//!
//! // Explicit transaction
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Node {id: 1})", None).await?.consume().await?;
//! tx.commit().await?;
//!
//! // Transaction function, retried on transient errors
//! let n = session
//!     .execute_write(|tx| {
//!         async move { tx.run("RETURN 1 AS n", None).await?.single().await?.get_int("n") }.boxed()
//!     })
//!     .await?;
//!
//! println!("bookmarks: {:?}", session.last_bookmarks());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use bolt_driver::{AuthToken, DriverConfig};
//! use std::time::Duration;
//!
//! let config = DriverConfig::builder("bolt://localhost:7687", AuthToken::basic("u", "p"))
//!     .unwrap()
//!     .with_max_connection_pool_size(50)
//!     .with_connection_timeout(Duration::from_secs(10))
//!     .with_max_transaction_retry_time(Duration::from_secs(15))
//!     .with_fetch_size(500)
//!     .build();
//! ```
//!
//! ## Error Handling
//!
//! Every error carries a stable machine-readable code:
//!
//! ```rust
//! use bolt_driver::DriverError;
//!
//! let err = DriverError::server("Neo.TransientError.Transaction.DeadlockDetected", "deadlock");
//! assert_eq!(err.code(), "Neo.TransientError.Transaction.DeadlockDetected");
//! assert!(err.is_retryable());
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Driver, pool, routing, sessions, transactions and retries
//! - [`bolt`] - Wire level: PackStream, framing, handshake, messages
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, BookmarkSet, Driver, DriverConfig, DriverConfigBuilder, DriverError,
    DriverMetrics, DriverResult, Query, QueryConfig, QueryResult, Record, RecordStream,
    ResultSummary, RetryPolicy, ServerAddress, ServerInfo, Session, SessionConfig,
    SessionConfigBuilder, Transaction, TransactionConfig, Value,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
