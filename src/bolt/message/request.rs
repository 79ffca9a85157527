//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. These types are
//! already shaped for one protocol version: choosing which fields to fill in
//! is the job of [`crate::bolt::protocol::BoltProtocol`].

use std::fmt;
use std::time::Duration;

use super::metadata::NotificationFilter;
use super::tag;
use crate::bolt::packstream::{PackStreamMap, PackStreamStructure, PackStreamValue};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Convert to string for metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token for HELLO and LOGON.
///
/// `Debug` output never contains the credentials.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "bearer")
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
    /// Additional parameters
    pub parameters: PackStreamMap,
}

impl AuthToken {
    fn with_scheme(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            principal: None,
            credentials: None,
            realm: None,
            parameters: PackStreamMap::new(),
        }
    }

    /// Create a basic auth token.
    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            ..Self::with_scheme("basic")
        }
    }

    /// Create a basic auth token for a specific realm.
    pub fn basic_with_realm(principal: &str, credentials: &str, realm: &str) -> Self {
        Self {
            realm: Some(realm.to_string()),
            ..Self::basic(principal, credentials)
        }
    }

    /// Create a bearer (SSO) token.
    pub fn bearer(token: &str) -> Self {
        Self {
            credentials: Some(token.to_string()),
            ..Self::with_scheme("bearer")
        }
    }

    /// Create a kerberos ticket token.
    pub fn kerberos(ticket: &str) -> Self {
        Self {
            principal: Some(String::new()),
            credentials: Some(ticket.to_string()),
            ..Self::with_scheme("kerberos")
        }
    }

    /// Create an anonymous auth token (no auth).
    pub fn none() -> Self {
        Self::with_scheme("none")
    }

    /// Create a token for a custom server-side auth plugin.
    pub fn custom(
        scheme: &str,
        principal: Option<&str>,
        credentials: Option<&str>,
        realm: Option<&str>,
        parameters: PackStreamMap,
    ) -> Self {
        Self {
            scheme: scheme.to_string(),
            principal: principal.map(str::to_string),
            credentials: credentials.map(str::to_string),
            realm: realm.map(str::to_string),
            parameters,
        }
    }

    /// Write the token fields into `map`.
    pub fn write_into(&self, map: &mut PackStreamMap) {
        map.insert("scheme".to_string(), self.scheme.as_str().into());
        if let Some(ref p) = self.principal {
            map.insert("principal".to_string(), p.as_str().into());
        }
        if let Some(ref c) = self.credentials {
            map.insert("credentials".to_string(), c.as_str().into());
        }
        if let Some(ref r) = self.realm {
            map.insert("realm".to_string(), r.as_str().into());
        }
        if !self.parameters.is_empty() {
            map.insert("parameters".to_string(), self.parameters.clone().into());
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "******"))
            .field("realm", &self.realm)
            .finish()
    }
}

/// Client identification sent as `bolt_agent` (5.3+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoltAgent {
    /// Product name and version
    pub product: String,
    /// Operating system and architecture
    pub platform: Option<String>,
    /// Implementation language
    pub language: Option<String>,
}

impl BoltAgent {
    /// Agent describing this crate.
    pub fn current() -> Self {
        Self {
            product: format!("bolt-driver/{}", env!("CARGO_PKG_VERSION")),
            platform: Some(format!("{}; {}", std::env::consts::OS, std::env::consts::ARCH)),
            language: Some("Rust".to_string()),
        }
    }

    fn to_map(&self) -> PackStreamMap {
        let mut map = PackStreamMap::new();
        map.insert("product".to_string(), self.product.as_str().into());
        if let Some(ref p) = self.platform {
            map.insert("platform".to_string(), p.as_str().into());
        }
        if let Some(ref l) = self.language {
            map.insert("language".to_string(), l.as_str().into());
        }
        map
    }
}

/// All Bolt request messages.
#[derive(Debug, Clone)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// LOGON - Authenticate (Bolt 5.1+)
    Logon(AuthToken),
    /// LOGOFF - Deauthenticate (Bolt 5.1+)
    Logoff,
    /// GOODBYE - Close connection gracefully
    Goodbye,
    /// RESET - Reset connection state
    Reset,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL with fetch size (Bolt 4.0+)
    Pull(StreamMessage),
    /// DISCARD with count (Bolt 4.0+)
    Discard(StreamMessage),
    /// PULL_ALL (Bolt 3)
    PullAll,
    /// DISCARD_ALL (Bolt 3)
    DiscardAll,
    /// BEGIN - Start transaction
    Begin(TransactionExtra),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
    /// ROUTE - Request routing information (Bolt 4.3+)
    Route(RouteMessage),
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Logon(_) => tag::LOGON,
            BoltRequest::Logoff => tag::LOGOFF,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Pull(_) | BoltRequest::PullAll => tag::PULL,
            BoltRequest::Discard(_) | BoltRequest::DiscardAll => tag::DISCARD,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Route(_) => tag::ROUTE,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Logon(_) => "LOGON",
            BoltRequest::Logoff => "LOGOFF",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Pull(_) => "PULL",
            BoltRequest::PullAll => "PULL_ALL",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::DiscardAll => "DISCARD_ALL",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Route(_) => "ROUTE",
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltRequest::Hello(msg) => vec![msg.to_extra().into()],
            BoltRequest::Logon(auth) => {
                let mut map = PackStreamMap::new();
                auth.write_into(&mut map);
                vec![map.into()]
            }
            BoltRequest::Run(msg) => vec![
                msg.query.as_str().into(),
                msg.parameters.clone().into(),
                msg.extra.to_map().into(),
            ],
            BoltRequest::Pull(msg) | BoltRequest::Discard(msg) => vec![msg.to_map().into()],
            BoltRequest::Begin(extra) => vec![extra.to_map().into()],
            BoltRequest::Route(msg) => msg.to_fields(),
            BoltRequest::Logoff
            | BoltRequest::Goodbye
            | BoltRequest::Reset
            | BoltRequest::PullAll
            | BoltRequest::DiscardAll
            | BoltRequest::Commit
            | BoltRequest::Rollback => vec![],
        };
        PackStreamStructure::new(self.tag(), fields)
    }
}

/// HELLO message - Initialize connection.
#[derive(Debug, Clone)]
pub struct HelloMessage {
    /// User agent string
    pub user_agent: String,
    /// Authentication, inline before Bolt 5.1
    pub auth: Option<AuthToken>,
    /// Routing context (4.1+), present only for routing drivers
    pub routing: Option<PackStreamMap>,
    /// Bolt agent (5.3+)
    pub bolt_agent: Option<BoltAgent>,
    /// Notification filter (5.2+)
    pub notification_filter: NotificationFilter,
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            auth: None,
            routing: None,
            bolt_agent: None,
            notification_filter: NotificationFilter::default(),
        }
    }

    fn to_extra(&self) -> PackStreamMap {
        let mut extra = PackStreamMap::new();
        extra.insert("user_agent".to_string(), self.user_agent.as_str().into());
        if let Some(ref auth) = self.auth {
            auth.write_into(&mut extra);
        }
        if let Some(ref routing) = self.routing {
            extra.insert("routing".to_string(), routing.clone().into());
        }
        if let Some(ref agent) = self.bolt_agent {
            extra.insert("bolt_agent".to_string(), agent.to_map().into());
        }
        self.notification_filter.apply_to(&mut extra);
        extra
    }
}

/// Extra map shared by BEGIN and auto-commit RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionExtra {
    /// Bookmarks to wait for
    pub bookmarks: Vec<String>,
    /// Transaction timeout
    pub tx_timeout: Option<Duration>,
    /// Transaction metadata
    pub tx_metadata: PackStreamMap,
    /// Access mode (read/write)
    pub mode: AccessMode,
    /// Database name (4.0+)
    pub database: Option<String>,
    /// Impersonated user (4.4+)
    pub imp_user: Option<String>,
    /// Notification filter (5.2+)
    pub notification_filter: NotificationFilter,
}

impl TransactionExtra {
    /// Convert to the wire map. Empty entries are left out.
    pub fn to_map(&self) -> PackStreamMap {
        let mut extra = PackStreamMap::new();

        if !self.bookmarks.is_empty() {
            extra.insert(
                "bookmarks".to_string(),
                PackStreamValue::List(self.bookmarks.iter().map(|b| b.as_str().into()).collect()),
            );
        }
        if let Some(timeout) = self.tx_timeout {
            extra.insert("tx_timeout".to_string(), PackStreamValue::Integer(timeout_millis(timeout)));
        }
        if !self.tx_metadata.is_empty() {
            extra.insert("tx_metadata".to_string(), self.tx_metadata.clone().into());
        }
        if self.mode == AccessMode::Read {
            extra.insert("mode".to_string(), "r".into());
        }
        if let Some(ref db) = self.database {
            extra.insert("db".to_string(), db.as_str().into());
        }
        if let Some(ref user) = self.imp_user {
            extra.insert("imp_user".to_string(), user.as_str().into());
        }
        self.notification_filter.apply_to(&mut extra);

        extra
    }
}

/// Whole milliseconds, rounding sub-millisecond remainders up so a tiny
/// timeout never becomes "no timeout".
fn timeout_millis(timeout: Duration) -> i64 {
    let millis = timeout.as_millis();
    let rounded = if timeout.as_nanos() % 1_000_000 != 0 { millis + 1 } else { millis };
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

/// RUN message - Execute a query.
#[derive(Debug, Clone)]
pub struct RunMessage {
    /// Query string
    pub query: String,
    /// Query parameters, already packed
    pub parameters: PackStreamMap,
    /// Extra metadata; empty inside an explicit transaction
    pub extra: TransactionExtra,
}

/// PULL / DISCARD body (4.0+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMessage {
    /// Number of records (-1 for all)
    pub n: i64,
    /// Query id, `None` for the last query of the transaction
    pub qid: Option<i64>,
}

impl StreamMessage {
    /// All remaining records of the last query.
    pub fn all() -> Self {
        Self { n: -1, qid: None }
    }

    fn to_map(self) -> PackStreamMap {
        let mut extra = PackStreamMap::new();
        extra.insert("n".to_string(), PackStreamValue::Integer(self.n));
        if let Some(qid) = self.qid {
            extra.insert("qid".to_string(), PackStreamValue::Integer(qid));
        }
        extra
    }
}

/// ROUTE message - Get routing information (Bolt 4.3+).
#[derive(Debug, Clone)]
pub struct RouteMessage {
    /// Routing context
    pub routing: PackStreamMap,
    /// Bookmarks
    pub bookmarks: Vec<String>,
    /// Database name, `None` for the home database
    pub database: Option<String>,
    /// Impersonated user
    pub imp_user: Option<String>,
    /// 4.4+ sends `{db, imp_user}` as the third field; 4.3 sends the bare
    /// database name.
    pub extra_map: bool,
}

impl RouteMessage {
    fn to_fields(&self) -> Vec<PackStreamValue> {
        let bookmarks =
            PackStreamValue::List(self.bookmarks.iter().map(|b| b.as_str().into()).collect());

        let third = if self.extra_map {
            let mut extra = PackStreamMap::new();
            if let Some(ref db) = self.database {
                extra.insert("db".to_string(), db.as_str().into());
            }
            if let Some(ref user) = self.imp_user {
                extra.insert("imp_user".to_string(), user.as_str().into());
            }
            extra.into()
        } else {
            self.database
                .as_deref()
                .map(PackStreamValue::from)
                .unwrap_or(PackStreamValue::Null)
        };

        vec![self.routing.clone().into(), bookmarks, third]
    }
}
