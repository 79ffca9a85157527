//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client.

use super::metadata::{Notification, QueryPlan, QueryStats, RoutingTable};
use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamMap, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Operation completed successfully
    Success(SuccessMessage),
    /// RECORD - Query result record
    Record(RecordMessage),
    /// FAILURE - Operation failed
    Failure(FailureMessage),
    /// IGNORED - Message was ignored (connection in FAILED state)
    Ignored,
}

impl BoltResponse {
    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Whether this response ends the current request's stream.
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(msg) => {
                PackStreamStructure::new(tag::SUCCESS, vec![msg.metadata.clone().into()])
            }
            BoltResponse::Record(msg) => {
                PackStreamStructure::new(tag::RECORD, vec![msg.fields.clone().into()])
            }
            BoltResponse::Failure(msg) => {
                let mut metadata = PackStreamMap::new();
                metadata.insert("code".to_string(), msg.code.as_str().into());
                metadata.insert("message".to_string(), msg.message.as_str().into());
                PackStreamStructure::new(tag::FAILURE, vec![metadata.into()])
            }
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, vec![]),
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::SUCCESS => {
                s.expect_fields(1)?;
                let metadata = s.map_field(0, "metadata")?.clone();
                Ok(BoltResponse::Success(SuccessMessage { metadata }))
            }
            tag::RECORD => {
                s.expect_fields(1)?;
                match s.fields.into_iter().next() {
                    Some(PackStreamValue::List(fields)) => {
                        Ok(BoltResponse::Record(RecordMessage { fields }))
                    }
                    _ => Err(PackStreamError::InvalidStructure(
                        "RECORD fields must be list".to_string(),
                    )),
                }
            }
            tag::FAILURE => {
                s.expect_fields(1)?;
                let metadata = s.map_field(0, "metadata")?;
                let text = |key: &str| {
                    metadata
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            PackStreamError::InvalidStructure(format!("FAILURE requires {}", key))
                        })
                };
                let code = text("neo4j_code").or_else(|_| text("code"))?;
                let message = text("message")?;
                Ok(BoltResponse::Failure(FailureMessage { code, message }))
            }
            tag::IGNORED => Ok(BoltResponse::Ignored),
            other => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                other
            ))),
        }
    }
}

/// SUCCESS message - Operation completed successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: PackStreamMap,
}

impl SuccessMessage {
    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: PackStreamMap) -> Self {
        Self { metadata }
    }

    /// Get a metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Server agent (HELLO).
    pub fn server(&self) -> Option<&str> {
        self.text("server")
    }

    /// Connection id (HELLO).
    pub fn connection_id(&self) -> Option<&str> {
        self.text("connection_id")
    }

    /// Result keys (RUN).
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields").and_then(|v| v.as_string_list())
    }

    /// Milliseconds until the first record was available (RUN).
    pub fn result_available_after(&self) -> Option<i64> {
        self.get("t_first").and_then(|v| v.as_int())
    }

    /// Milliseconds until the last record was consumed (PULL).
    pub fn result_consumed_after(&self) -> Option<i64> {
        self.get("t_last").and_then(|v| v.as_int())
    }

    /// Query id inside an explicit transaction (RUN, 4.0+).
    pub fn qid(&self) -> Option<i64> {
        self.get("qid").and_then(|v| v.as_int())
    }

    /// More records are waiting to be pulled (PULL).
    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Bookmark of the finished transaction (PULL in auto-commit, COMMIT).
    pub fn bookmark(&self) -> Option<&str> {
        self.text("bookmark")
    }

    /// Database the query ran against.
    pub fn db(&self) -> Option<&str> {
        self.text("db")
    }

    /// Query type: `r`, `w`, `rw` or `s`.
    pub fn query_type(&self) -> Option<&str> {
        self.text("type")
    }

    /// Update counters.
    pub fn stats(&self) -> Option<QueryStats> {
        self.get("stats").and_then(|v| v.as_map()).map(QueryStats::from_map)
    }

    /// Notifications.
    pub fn notifications(&self) -> Vec<Notification> {
        self.get("notifications")
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|n| n.as_map().and_then(Notification::from_map))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// EXPLAIN plan.
    pub fn plan(&self) -> Option<QueryPlan> {
        self.get("plan").and_then(|v| v.as_map()).and_then(QueryPlan::from_map)
    }

    /// PROFILE plan.
    pub fn profile(&self) -> Option<QueryPlan> {
        self.get("profile").and_then(|v| v.as_map()).and_then(QueryPlan::from_map)
    }

    /// Routing table (ROUTE).
    pub fn routing_table(&self) -> Option<Result<RoutingTable, String>> {
        self.get("rt").and_then(|v| v.as_map()).map(RoutingTable::from_map)
    }
}

/// RECORD message - Query result record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    /// Field values
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a new RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }
}

/// FAILURE message - Operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Server error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accessors() {
        let mut metadata = PackStreamMap::new();
        metadata.insert("server".into(), "Neo4j/5.13.0".into());
        metadata.insert("fields".into(), PackStreamValue::List(vec!["n".into(), "m".into()]));
        metadata.insert("has_more".into(), PackStreamValue::Boolean(true));
        metadata.insert("bookmark".into(), "bm:42".into());
        let msg = SuccessMessage::with_metadata(metadata);

        assert_eq!(msg.server(), Some("Neo4j/5.13.0"));
        assert_eq!(msg.fields(), Some(vec!["n".to_string(), "m".to_string()]));
        assert!(msg.has_more());
        assert_eq!(msg.bookmark(), Some("bm:42"));
        assert!(msg.stats().is_none());
        assert!(msg.notifications().is_empty());
    }

    #[test]
    fn test_parse_responses() {
        let failure = BoltResponse::Failure(FailureMessage::new(
            "Neo.ClientError.Statement.SyntaxError",
            "bad",
        ));
        assert_eq!(BoltResponse::from_structure(failure.to_structure()).unwrap(), failure);

        let record = BoltResponse::Record(RecordMessage::new(vec![PackStreamValue::Integer(1)]));
        assert_eq!(BoltResponse::from_structure(record.to_structure()).unwrap(), record);
        assert!(!record.is_summary());

        assert_eq!(
            BoltResponse::from_structure(PackStreamStructure::new(tag::IGNORED, vec![])).unwrap(),
            BoltResponse::Ignored
        );
    }

    #[test]
    fn test_success_arity_checked() {
        let s = PackStreamStructure::new(tag::SUCCESS, vec![]);
        assert!(matches!(
            BoltResponse::from_structure(s),
            Err(PackStreamError::MalformedStructure { tag: 0x70, expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let s = PackStreamStructure::new(0x01, vec![]);
        assert!(BoltResponse::from_structure(s).is_err());
    }

    #[test]
    fn test_failure_display() {
        let f = FailureMessage::new("Neo.ClientError.Cluster.NotALeader", "no");
        assert_eq!(f.to_string(), "Neo.ClientError.Cluster.NotALeader: no");
    }
}
