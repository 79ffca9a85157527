//! Bolt connection.
//!
//! One physical channel bound to one negotiated protocol version. Requests
//! are written through the chunking codec; every request that expects a
//! reply gets a queue entry, and incoming messages are matched to the head
//! of that queue strictly in send order.
//!
//! Handshake and HELLO happen inside [`Connection::open`]; a `Connection`
//! value therefore always starts out `Ready`. From there RUN/PULL/DISCARD
//! move it to `Streaming` until the queue drains, a FAILURE moves it to
//! `Failed` (only RESET or GOODBYE may follow), and GOODBYE or a transport
//! error ends it.
//!
//! Reads and writes mark the connection broken while they are in flight. A
//! future dropped mid-I/O, or a read that hits the read timeout, therefore
//! leaves a connection the pool will destroy rather than reuse.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use super::observer::{self, PendingResponse, ResponseEvent, ResponseHandle};
use super::transport::BoxedTransport;
use crate::bolt::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::bolt::handshake::{self, DEFAULT_PROPOSALS};
use crate::bolt::{
    AuthToken, BoltCodec, BoltProtocol, BoltRequest, BoltResponse, BoltVersion,
    NotificationFilter, Outgoing, PackStreamMap, PackStreamValue, SuccessMessage,
};
use crate::driver::driver::ServerAddress;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::hydration::{HydrationOptions, IntegerMode};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection state after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle, any request may be sent
    Ready,
    /// Results outstanding
    Streaming,
    /// Server reported FAILURE; only RESET or GOODBYE are accepted
    Failed,
    /// GOODBYE sent or transport gone
    Closed,
}

/// Everything needed to open and initialise a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// User agent sent in HELLO
    pub user_agent: String,
    /// Credentials
    pub auth: AuthToken,
    /// Routing context; `Some` only for routing drivers
    pub routing_context: Option<PackStreamMap>,
    /// Connection-wide notification filter
    pub notification_filter: NotificationFilter,
    /// Integer representation for received values
    pub integer_mode: IntegerMode,
    /// Bound on handshake plus HELLO
    pub connect_timeout: Duration,
    /// Bound on every read, if any
    pub read_timeout: Option<Duration>,
    /// Largest accepted incoming message
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("bolt-driver/{}", env!("CARGO_PKG_VERSION")),
            auth: AuthToken::none(),
            routing_context: None,
            notification_filter: NotificationFilter::default(),
            integer_mode: IntegerMode::default(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// A single Bolt connection.
pub struct Connection {
    id: u64,
    address: ServerAddress,
    transport: BoxedTransport,
    codec: BoltCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    protocol: BoltProtocol,
    hydration: HydrationOptions,
    state: ConnectionState,
    pending: VecDeque<PendingResponse>,
    in_transaction: bool,
    broken: bool,
    server_agent: Option<String>,
    connection_id: Option<String>,
    created_at: Instant,
    last_used: Instant,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Handshake, then HELLO (and LOGON on 5.1+), bounded by the connect
    /// timeout. `now` stamps the creation time for lifetime checks.
    pub async fn open(
        mut transport: BoxedTransport,
        address: ServerAddress,
        settings: &ConnectionSettings,
        now: Instant,
    ) -> DriverResult<Self> {
        let version = tokio::time::timeout(
            settings.connect_timeout,
            handshake::perform(&mut transport, &DEFAULT_PROPOSALS),
        )
        .await
        .map_err(|_| {
            DriverError::connection_failed(format!("handshake with {} timed out", address))
        })??;
        debug!(address = %address, version = %version, "Bolt handshake complete");

        let protocol = BoltProtocol::new(version);
        let mut conn = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            address,
            transport,
            codec: BoltCodec::with_max_size(settings.max_message_size),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            protocol,
            hydration: HydrationOptions::new(version, settings.integer_mode),
            state: ConnectionState::Ready,
            pending: VecDeque::new(),
            in_transaction: false,
            broken: false,
            server_agent: None,
            connection_id: None,
            created_at: now,
            last_used: now,
            read_timeout: settings.read_timeout,
        };

        let init = tokio::time::timeout(settings.connect_timeout, conn.initialize(settings)).await;
        match init {
            Ok(Ok(())) => Ok(conn),
            Ok(Err(e)) => {
                conn.close().await;
                Err(e)
            }
            Err(_) => {
                conn.close().await;
                Err(DriverError::connection_failed(format!(
                    "initialising connection to {} timed out",
                    conn.address
                )))
            }
        }
    }

    async fn initialize(&mut self, settings: &ConnectionSettings) -> DriverResult<()> {
        let batch = self.protocol.hello(
            &settings.user_agent,
            &settings.auth,
            settings.routing_context.as_ref(),
            &settings.notification_filter,
        )?;
        let mut handles = self.send(batch).await?;
        for (i, handle) in handles.iter_mut().enumerate() {
            let success = self.summary(handle).await?;
            if i == 0 {
                self.server_agent = success.server().map(str::to_string);
                self.connection_id = success.connection_id().map(str::to_string);
            }
        }
        debug!(
            id = self.id,
            address = %self.address,
            server = self.server_agent.as_deref().unwrap_or("unknown"),
            "connection opened"
        );
        Ok(())
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Write a batch of requests and return one handle per request that
    /// expects a reply, in send order.
    ///
    /// Every message is packed before anything is written, so a packing
    /// failure leaves the connection untouched and usable. The write buffer
    /// is flushed if any message of the batch asks for it.
    pub async fn send(&mut self, batch: Vec<Outgoing>) -> DriverResult<Vec<ResponseHandle>> {
        self.ensure_can_send(&batch)?;

        let mut encoded = BytesMut::new();
        for out in &batch {
            let value: PackStreamValue = out.request.to_structure().into();
            self.codec.encode(&value, &mut encoded)?;
        }
        self.write_buffer.extend_from_slice(&encoded);

        let mut handles = Vec::with_capacity(batch.len());
        let mut flush = false;
        for out in batch {
            self.track(&out.request);
            flush |= out.flush;
            if matches!(out.request, BoltRequest::Goodbye) {
                continue;
            }
            let (pending, handle) = observer::channel(out.request.name());
            self.pending.push_back(pending);
            handles.push(handle);
        }

        if flush {
            self.flush().await?;
        }
        self.last_used = Instant::now();
        Ok(handles)
    }

    fn ensure_can_send(&self, batch: &[Outgoing]) -> DriverResult<()> {
        if self.broken || self.state == ConnectionState::Closed {
            return Err(DriverError::connection_failed(format!(
                "connection to {} is no longer usable",
                self.address
            )));
        }
        if self.state == ConnectionState::Failed
            && !batch
                .iter()
                .all(|o| matches!(o.request, BoltRequest::Reset | BoltRequest::Goodbye))
        {
            return Err(DriverError::connection_failed(format!(
                "connection to {} has failed; only RESET or GOODBYE may be sent",
                self.address
            )));
        }
        Ok(())
    }

    fn track(&mut self, request: &BoltRequest) {
        match request {
            BoltRequest::Begin(_) => self.in_transaction = true,
            BoltRequest::Commit | BoltRequest::Rollback => self.in_transaction = false,
            BoltRequest::Run(_)
            | BoltRequest::Pull(_)
            | BoltRequest::PullAll
            | BoltRequest::Discard(_)
            | BoltRequest::DiscardAll => {
                if self.state == ConnectionState::Ready {
                    self.state = ConnectionState::Streaming;
                }
            }
            _ => {}
        }
    }

    async fn flush(&mut self) -> DriverResult<()> {
        self.broken = true;
        self.transport.write_all(&self.write_buffer).await?;
        self.transport.flush().await?;
        self.write_buffer.clear();
        self.broken = false;
        Ok(())
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Next event for `handle`, reading from the wire as needed. Messages
    /// for requests queued before `handle` are dispatched to their own
    /// handles on the way.
    pub async fn next_event(&mut self, handle: &mut ResponseHandle) -> DriverResult<ResponseEvent> {
        loop {
            if let Some(event) = handle.try_take() {
                return Ok(event);
            }
            if handle.is_done() || self.pending.is_empty() {
                return Err(DriverError::protocol(format!(
                    "no response outstanding for {}",
                    handle.request()
                )));
            }
            self.receive_one().await?;
        }
    }

    /// Wait for the summary of `handle`, discarding records.
    pub async fn summary(&mut self, handle: &mut ResponseHandle) -> DriverResult<SuccessMessage> {
        loop {
            match self.next_event(handle).await? {
                ResponseEvent::Record(_) => continue,
                ResponseEvent::Success(success) => return Ok(success),
                ResponseEvent::Failure(failure) => return Err(failure.into()),
                ResponseEvent::Ignored => return Err(ignored(handle.request())),
            }
        }
    }

    async fn receive_one(&mut self) -> DriverResult<()> {
        let value = match self.read_message().await {
            Ok(v) => v,
            Err(e) => {
                self.broken = true;
                return Err(e);
            }
        };
        let structure = value.into_structure().ok_or_else(|| {
            self.broken = true;
            DriverError::protocol("response is not a structure")
        })?;
        let response = BoltResponse::from_structure(structure).map_err(|e| {
            self.broken = true;
            DriverError::from(e)
        })?;

        if self.pending.is_empty() {
            self.broken = true;
            self.state = ConnectionState::Failed;
            return Err(DriverError::protocol(format!(
                "received {} with no request outstanding",
                response.name()
            )));
        }

        match response {
            BoltResponse::Record(record) => {
                if let Some(head) = self.pending.front() {
                    head.deliver(ResponseEvent::Record(record.fields));
                }
            }
            BoltResponse::Success(success) => {
                if let Some(head) = self.pending.pop_front() {
                    if head.request == "RESET" {
                        self.state = ConnectionState::Ready;
                        self.in_transaction = false;
                    }
                    head.deliver(ResponseEvent::Success(success));
                }
            }
            BoltResponse::Failure(failure) => {
                if let Some(head) = self.pending.pop_front() {
                    debug!(id = self.id, request = head.request, code = %failure.code, "request failed");
                    self.state = ConnectionState::Failed;
                    head.deliver(ResponseEvent::Failure(failure));
                }
            }
            BoltResponse::Ignored => {
                if let Some(head) = self.pending.pop_front() {
                    head.deliver(ResponseEvent::Ignored);
                }
            }
        }

        if self.pending.is_empty() && self.state == ConnectionState::Streaming {
            self.state = ConnectionState::Ready;
        }
        Ok(())
    }

    async fn read_message(&mut self) -> DriverResult<PackStreamValue> {
        loop {
            if let Some(value) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(value);
            }

            self.broken = true;
            let read = self.transport.read_buf(&mut self.read_buffer);
            let n = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| {
                    DriverError::timeout(format!("no response from {} within {:?}", self.address, limit))
                })??,
                None => read.await?,
            };
            if n == 0 {
                self.state = ConnectionState::Closed;
                return Err(DriverError::connection_failed(format!(
                    "connection closed by {}",
                    self.address
                )));
            }
            self.broken = false;
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// RESET: discard outstanding results, leave any transaction and clear
    /// a failure.
    pub async fn reset(&mut self) -> DriverResult<()> {
        let batch = self.protocol.reset();
        let mut handles = self.send(batch).await?;
        for handle in handles.iter_mut() {
            self.summary(handle).await?;
        }
        Ok(())
    }

    /// Switch credentials without reconnecting (5.1+).
    pub async fn reauthenticate(&mut self, auth: &AuthToken) -> DriverResult<()> {
        let batch = self.protocol.reauthenticate(auth)?;
        let mut handles = self.send(batch).await?;
        for handle in handles.iter_mut() {
            self.summary(handle).await?;
        }
        Ok(())
    }

    /// GOODBYE if the connection is still healthy, then shut the transport.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if !self.broken {
            let batch = self.protocol.goodbye();
            if let Err(e) = self.send(batch).await {
                warn!(id = self.id, address = %self.address, error = %e, "GOODBYE failed");
            }
        }
        let _ = self.transport.shutdown().await;
        self.state = ConnectionState::Closed;
        self.pending.clear();
        debug!(id = self.id, address = %self.address, "connection closed");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Server address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Negotiated version.
    pub fn version(&self) -> BoltVersion {
        self.protocol.version()
    }

    /// Message builder for the negotiated version.
    pub fn protocol(&self) -> &BoltProtocol {
        &self.protocol
    }

    /// Value conversion settings for the negotiated version.
    pub fn hydration(&self) -> &HydrationOptions {
        &self.hydration
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `server` from the HELLO reply.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// `connection_id` from the HELLO reply.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Creation time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of the last send.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub(crate) fn set_last_used(&mut self, now: Instant) {
        self.last_used = now;
    }

    /// I/O was interrupted or failed; the connection must be destroyed.
    pub fn is_broken(&self) -> bool {
        self.broken || self.state == ConnectionState::Closed
    }

    /// Force the connection to be destroyed on release.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Idle with nothing outstanding and no open transaction.
    pub fn is_clean(&self) -> bool {
        !self.is_broken()
            && self.state == ConnectionState::Ready
            && self.pending.is_empty()
            && !self.in_transaction
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("version", &self.protocol.version())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("broken", &self.broken)
            .finish()
    }
}

fn ignored(request: &str) -> DriverError {
    DriverError::transaction(format!("{} was ignored because an earlier request failed", request))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::{FailureMessage, TransactionExtra};
    use crate::driver::testkit::{failure, record, success, TestConnector};

    fn address() -> ServerAddress {
        ServerAddress::new("db1", 7687)
    }

    #[tokio::test]
    async fn test_open_sends_hello_and_logon() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let conn = connector.open(&address()).await.unwrap();

        assert_eq!(conn.version(), BoltVersion::V5_4);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.server_agent(), Some("Neo4j/5.13.0"));
        assert_eq!(connector.tags(), vec![tag::HELLO, tag::LOGON]);
    }

    #[tokio::test]
    async fn test_open_inlines_auth_before_logon() {
        let connector = TestConnector::new(BoltVersion::V4_4);
        let conn = connector.open(&address()).await.unwrap();

        assert_eq!(conn.version(), BoltVersion::V4_4);
        assert_eq!(connector.tags(), vec![tag::HELLO]);
        let hello = &connector.requests(tag::HELLO)[0];
        assert_eq!(hello.fields[0].as_map().unwrap().get("scheme"), Some(&"basic".into()));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| {
            (req.tag == tag::LOGON).then(|| {
                vec![failure("Neo.ClientError.Security.Unauthorized", "bad credentials")]
            })
        });
        let err = connector.open(&address()).await.unwrap_err();
        assert!(matches!(err, DriverError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_fifo_dispatch_of_pipelined_requests() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => {
                let query = req.fields[0].as_str().unwrap_or_default().to_string();
                Some(vec![success(vec![
                    ("fields", vec![PackStreamValue::from("q")].into()),
                    ("qid", PackStreamValue::Integer(query.len() as i64)),
                ])])
            }
            tag::PULL => Some(vec![
                record(vec![PackStreamValue::Integer(1)]),
                record(vec![PackStreamValue::Integer(2)]),
                success(vec![]),
            ]),
            _ => None,
        });
        let mut conn = connector.open(&address()).await.unwrap();

        let extra = TransactionExtra::default();
        let mut batch = conn
            .protocol()
            .run_auto_commit("A", PackStreamMap::new(), extra.clone(), -1)
            .unwrap();
        // Second query pipelined behind the first without awaiting anything.
        batch[1].flush = false;
        batch.extend(conn.protocol().run_auto_commit("BB", PackStreamMap::new(), extra, -1).unwrap());
        let mut handles = conn.send(batch).await.unwrap();
        assert_eq!(handles.len(), 4);

        // Ask for the last handle first; everything before it is dispatched
        // to the earlier handles in order.
        let (first, rest) = handles.split_at_mut(1);
        let last_run = conn.summary(&mut rest[1]).await.unwrap();
        assert_eq!(last_run.qid(), Some(2));

        let first_run = conn.summary(&mut first[0]).await.unwrap();
        assert_eq!(first_run.qid(), Some(1));

        let mut rows = Vec::new();
        loop {
            match conn.next_event(&mut rest[0]).await.unwrap() {
                ResponseEvent::Record(fields) => rows.push(fields[0].as_int().unwrap()),
                ResponseEvent::Success(_) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(rows, vec![1, 2]);

        let mut second_rows = 0;
        loop {
            match conn.next_event(&mut rest[2]).await.unwrap() {
                ResponseEvent::Record(_) => second_rows += 1,
                ResponseEvent::Success(_) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(second_rows, 2);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_failure_then_only_reset_allowed() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| {
            (req.tag == tag::RUN).then(|| vec![failure("Neo.ClientError.Statement.SyntaxError", "oops")])
        });
        let mut conn = connector.open(&address()).await.unwrap();

        let batch = conn
            .protocol()
            .run_auto_commit("RETURN", PackStreamMap::new(), TransactionExtra::default(), 10)
            .unwrap();
        let mut handles = conn.send(batch).await.unwrap();
        let err = conn.summary(&mut handles[0]).await.unwrap_err();
        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        let ignored = conn.summary(&mut handles[1]).await.unwrap_err();
        assert_eq!(ignored.code(), "TransactionError");
        assert_eq!(conn.state(), ConnectionState::Failed);

        let sent_before = connector.tags().len();
        let begin = conn.protocol().begin(TransactionExtra::default()).unwrap();
        let err = conn.send(begin).await.unwrap_err();
        assert_eq!(err.code(), "ConnectionFailedError");
        assert_eq!(connector.tags().len(), sent_before, "nothing reaches the server");

        conn.reset().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert!(conn.is_clean());
    }

    #[tokio::test]
    async fn test_feature_not_supported_is_local() {
        let connector = TestConnector::new(BoltVersion::V4_2);
        let mut conn = connector.open(&address()).await.unwrap();

        let err = conn.reauthenticate(&AuthToken::basic("u", "p")).await.unwrap_err();
        assert_eq!(err.code(), "FeatureNotSupportedError");
        assert!(!conn.is_broken());
        assert_eq!(connector.tags(), vec![tag::HELLO]);
    }

    #[tokio::test]
    async fn test_packing_failure_writes_nothing() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let mut conn = connector.open(&address()).await.unwrap();

        let mut params = PackStreamMap::new();
        params.insert(
            "wide".into(),
            crate::bolt::PackStreamStructure::new(0x01, vec![PackStreamValue::Null; 70_000]).into(),
        );
        let batch = conn
            .protocol()
            .run_auto_commit("RETURN $wide", params, TransactionExtra::default(), 10)
            .unwrap();
        assert!(conn.send(batch).await.is_err());
        assert!(conn.is_clean());

        conn.reset().await.unwrap();
        assert_eq!(connector.tags(), vec![tag::HELLO, tag::LOGON, tag::RESET]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_breaks_connection() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| {
            (req.tag == tag::RESET).then(Vec::new)
        });
        let mut settings = TestConnector::settings();
        settings.read_timeout = Some(Duration::from_secs(5));
        let mut conn = connector.open_with(&address(), &settings).await.unwrap();

        let err = conn.reset().await.unwrap_err();
        assert_eq!(err.code(), "Timeout");
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn test_cancelled_read_leaves_connection_broken() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| {
            (req.tag == tag::RESET).then(Vec::new)
        });
        let mut conn = connector.open(&address()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(20), conn.reset()).await;
        assert!(result.is_err());
        assert!(conn.is_broken());
        assert!(!conn.is_clean());
    }

    #[tokio::test]
    async fn test_goodbye_has_no_reply() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let mut conn = connector.open(&address()).await.unwrap();
        conn.close().await;

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.is_broken());
        for _ in 0..100 {
            if connector.tags().last() == Some(&tag::GOODBYE) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(connector.tags().last(), Some(&tag::GOODBYE));
    }

    #[test]
    fn test_ignored_error_code() {
        let err = ignored("PULL");
        assert_eq!(err.code(), "TransactionError");
        let failure: DriverError = FailureMessage::new("Neo.TransientError.General.DatabaseUnavailable", "x").into();
        assert!(failure.is_retryable());
    }
}
