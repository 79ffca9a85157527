//! Versioned protocol table.
//!
//! A [`BoltProtocol`] is picked once, right after the handshake, and turns
//! high level operations into the message sequence the negotiated version
//! understands. Each builder returns the messages in send order together
//! with their flush flags; only the last message of a pipelined batch
//! flushes. Operations the version cannot express fail here, before any
//! byte reaches the socket.

use super::error::{BoltError, BoltResult};
use super::handshake::BoltVersion;
use super::message::{
    AccessMode, AuthToken, BoltAgent, BoltRequest, HelloMessage, NotificationFilter,
    RouteMessage, RunMessage, StreamMessage, TransactionExtra,
};
use super::packstream::{PackStreamMap, PackStreamValue};

/// Database the routing procedure runs against on 4.0 to 4.2.
pub const SYSTEM_DATABASE: &str = "system";

/// Routing procedure for Bolt 3.
pub const ROUTING_PROCEDURE_V3: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";

/// Routing procedure for Bolt 4.0 to 4.2.
pub const ROUTING_PROCEDURE_V4: &str = "CALL dbms.routing.getRoutingTable($context, $database)";

/// Feature flags of one protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// PULL/DISCARD carry `n` and `qid`; otherwise PULL_ALL/DISCARD_ALL
    pub pull_n: bool,
    /// `db` in BEGIN and RUN
    pub multi_database: bool,
    /// `routing` in HELLO
    pub routing_context_in_hello: bool,
    /// ROUTE message instead of the routing procedure
    pub route_message: bool,
    /// `imp_user` in BEGIN, RUN and ROUTE
    pub impersonation: bool,
    /// ROUTE takes an extra map instead of a database name
    pub route_extra_map: bool,
    /// Graph entities carry element ids
    pub element_ids: bool,
    /// Zoned date-times count seconds in UTC
    pub utc_datetime: bool,
    /// Authentication is sent with LOGON, not HELLO
    pub logon: bool,
    /// Notification filters in HELLO, BEGIN and RUN
    pub notification_filters: bool,
    /// `bolt_agent` in HELLO
    pub bolt_agent: bool,
}

impl Capabilities {
    /// Capability table entry for `version`.
    pub fn for_version(version: BoltVersion) -> Self {
        use BoltVersion::*;
        Self {
            pull_n: version >= V4_0,
            multi_database: version >= V4_0,
            routing_context_in_hello: version >= V4_1,
            route_message: version >= V4_3,
            impersonation: version >= V4_4,
            route_extra_map: version >= V4_4,
            element_ids: version >= V5_0,
            utc_datetime: version >= V5_0,
            logon: version >= V5_1,
            notification_filters: version >= V5_2,
            bolt_agent: version >= V5_3,
        }
    }
}

/// A request and whether the write buffer is flushed after it.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Request message
    pub request: BoltRequest,
    /// Flush after writing this message
    pub flush: bool,
}

impl Outgoing {
    fn buffered(request: BoltRequest) -> Self {
        Self { request, flush: false }
    }

    fn flushed(request: BoltRequest) -> Self {
        Self { request, flush: true }
    }
}

/// How a routing table is requested on this version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStyle {
    /// ROUTE message answered by a SUCCESS with `rt`
    Message,
    /// Routing procedure answered by records `[ttl, servers]`
    Procedure,
}

/// Message builder bound to a negotiated version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoltProtocol {
    version: BoltVersion,
    capabilities: Capabilities,
}

impl BoltProtocol {
    /// Protocol for a negotiated version.
    pub fn new(version: BoltVersion) -> Self {
        Self {
            version,
            capabilities: Capabilities::for_version(version),
        }
    }

    /// Negotiated version.
    pub fn version(&self) -> BoltVersion {
        self.version
    }

    /// Feature flags.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// How routing tables are fetched.
    pub fn route_style(&self) -> RouteStyle {
        if self.capabilities.route_message {
            RouteStyle::Message
        } else {
            RouteStyle::Procedure
        }
    }

    fn unsupported(&self, feature: &'static str) -> BoltError {
        BoltError::FeatureNotSupported {
            feature,
            version: self.version,
        }
    }

    fn check_notification_filter(&self, filter: &NotificationFilter) -> BoltResult<()> {
        if !filter.is_empty() && !self.capabilities.notification_filters {
            return Err(self.unsupported("notification filters"));
        }
        Ok(())
    }

    fn check_transaction_extra(&self, extra: &TransactionExtra) -> BoltResult<()> {
        if extra.database.is_some() && !self.capabilities.multi_database {
            return Err(self.unsupported("multi-database"));
        }
        if extra.imp_user.is_some() && !self.capabilities.impersonation {
            return Err(self.unsupported("impersonation"));
        }
        self.check_notification_filter(&extra.notification_filter)
    }

    /// Open the connection: HELLO, followed by LOGON on 5.1+.
    pub fn hello(
        &self,
        user_agent: &str,
        auth: &AuthToken,
        routing: Option<&PackStreamMap>,
        notification_filter: &NotificationFilter,
    ) -> BoltResult<Vec<Outgoing>> {
        self.check_notification_filter(notification_filter)?;

        let mut hello = HelloMessage::new(user_agent);
        if self.capabilities.routing_context_in_hello {
            hello.routing = routing.cloned();
        }
        if self.capabilities.bolt_agent {
            hello.bolt_agent = Some(BoltAgent::current());
        }
        hello.notification_filter = notification_filter.clone();

        if self.capabilities.logon {
            Ok(vec![
                Outgoing::buffered(BoltRequest::Hello(hello)),
                Outgoing::flushed(BoltRequest::Logon(auth.clone())),
            ])
        } else {
            hello.auth = Some(auth.clone());
            Ok(vec![Outgoing::flushed(BoltRequest::Hello(hello))])
        }
    }

    /// Switch credentials on an open connection (5.1+).
    pub fn reauthenticate(&self, auth: &AuthToken) -> BoltResult<Vec<Outgoing>> {
        if !self.capabilities.logon {
            return Err(self.unsupported("re-authentication"));
        }
        Ok(vec![
            Outgoing::buffered(BoltRequest::Logoff),
            Outgoing::flushed(BoltRequest::Logon(auth.clone())),
        ])
    }

    /// Start an explicit transaction.
    pub fn begin(&self, extra: TransactionExtra) -> BoltResult<Vec<Outgoing>> {
        self.check_transaction_extra(&extra)?;
        Ok(vec![Outgoing::flushed(BoltRequest::Begin(extra))])
    }

    /// Auto-commit query: RUN pipelined with the first PULL.
    pub fn run_auto_commit(
        &self,
        query: &str,
        parameters: PackStreamMap,
        extra: TransactionExtra,
        fetch_size: i64,
    ) -> BoltResult<Vec<Outgoing>> {
        self.check_transaction_extra(&extra)?;
        let run = BoltRequest::Run(RunMessage {
            query: query.to_string(),
            parameters,
            extra,
        });
        Ok(vec![Outgoing::buffered(run), self.pull(fetch_size, None)])
    }

    /// Query inside an explicit transaction: RUN pipelined with the first PULL.
    pub fn run_in_transaction(
        &self,
        query: &str,
        parameters: PackStreamMap,
        fetch_size: i64,
    ) -> Vec<Outgoing> {
        let run = BoltRequest::Run(RunMessage {
            query: query.to_string(),
            parameters,
            extra: TransactionExtra::default(),
        });
        vec![Outgoing::buffered(run), self.pull(fetch_size, None)]
    }

    /// Fetch the next batch of records. Bolt 3 always pulls everything.
    pub fn pull(&self, n: i64, qid: Option<i64>) -> Outgoing {
        if self.capabilities.pull_n {
            Outgoing::flushed(BoltRequest::Pull(StreamMessage { n, qid }))
        } else {
            Outgoing::flushed(BoltRequest::PullAll)
        }
    }

    /// Throw away the remaining records.
    pub fn discard(&self, qid: Option<i64>) -> Outgoing {
        if self.capabilities.pull_n {
            Outgoing::flushed(BoltRequest::Discard(StreamMessage { n: -1, qid }))
        } else {
            Outgoing::flushed(BoltRequest::DiscardAll)
        }
    }

    /// Commit the open transaction.
    pub fn commit(&self) -> Vec<Outgoing> {
        vec![Outgoing::flushed(BoltRequest::Commit)]
    }

    /// Roll back the open transaction.
    pub fn rollback(&self) -> Vec<Outgoing> {
        vec![Outgoing::flushed(BoltRequest::Rollback)]
    }

    /// Return the connection to a clean state.
    pub fn reset(&self) -> Vec<Outgoing> {
        vec![Outgoing::flushed(BoltRequest::Reset)]
    }

    /// Announce a clean close. The server sends no reply.
    pub fn goodbye(&self) -> Vec<Outgoing> {
        vec![Outgoing::flushed(BoltRequest::Goodbye)]
    }

    /// Request a routing table.
    ///
    /// `context` must already contain the `address` entry. On versions
    /// without ROUTE this is a RUN of the routing procedure pipelined with
    /// PULL; the records then carry `ttl` and `servers`.
    pub fn route(
        &self,
        context: PackStreamMap,
        bookmarks: Vec<String>,
        database: Option<&str>,
        imp_user: Option<&str>,
    ) -> BoltResult<Vec<Outgoing>> {
        if imp_user.is_some() && !self.capabilities.impersonation {
            return Err(self.unsupported("impersonation"));
        }

        if self.capabilities.route_message {
            let route = RouteMessage {
                routing: context,
                bookmarks,
                database: database.map(str::to_string),
                imp_user: imp_user.map(str::to_string),
                extra_map: self.capabilities.route_extra_map,
            };
            return Ok(vec![Outgoing::flushed(BoltRequest::Route(route))]);
        }

        let mut parameters = PackStreamMap::new();
        parameters.insert("context".to_string(), context.into());

        let (query, extra) = if self.capabilities.multi_database {
            parameters.insert(
                "database".to_string(),
                database.map(PackStreamValue::from).unwrap_or(PackStreamValue::Null),
            );
            let extra = TransactionExtra {
                bookmarks,
                mode: AccessMode::Read,
                database: Some(SYSTEM_DATABASE.to_string()),
                ..Default::default()
            };
            (ROUTING_PROCEDURE_V4, extra)
        } else {
            if database.is_some() {
                return Err(self.unsupported("multi-database"));
            }
            let extra = TransactionExtra {
                bookmarks,
                mode: AccessMode::Write,
                ..Default::default()
            };
            (ROUTING_PROCEDURE_V3, extra)
        };

        self.run_auto_commit(query, parameters, extra, -1)
    }
}
