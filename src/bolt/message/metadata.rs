//! Bolt protocol metadata types.
//!
//! Structured views over the maps carried in SUCCESS metadata, plus the
//! notification filter sent with HELLO, BEGIN and RUN.

use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// Query statistics returned in SUCCESS after PULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes created
    pub nodes_created: i64,
    /// Nodes deleted
    pub nodes_deleted: i64,
    /// Relationships created
    pub relationships_created: i64,
    /// Relationships deleted
    pub relationships_deleted: i64,
    /// Properties set
    pub properties_set: i64,
    /// Labels added
    pub labels_added: i64,
    /// Labels removed
    pub labels_removed: i64,
    /// Indexes added
    pub indexes_added: i64,
    /// Indexes removed
    pub indexes_removed: i64,
    /// Constraints added
    pub constraints_added: i64,
    /// Constraints removed
    pub constraints_removed: i64,
    /// System updates
    pub system_updates: i64,
    /// Contains system updates
    pub contains_system_updates: bool,
    /// Contains updates
    pub contains_updates: bool,
}

impl QueryStats {
    /// Check if there were any modifications.
    pub fn has_updates(&self) -> bool {
        self.contains_updates
            || [
                self.nodes_created,
                self.nodes_deleted,
                self.relationships_created,
                self.relationships_deleted,
                self.properties_set,
                self.labels_added,
                self.labels_removed,
                self.indexes_added,
                self.indexes_removed,
                self.constraints_added,
                self.constraints_removed,
            ]
            .iter()
            .any(|n| *n > 0)
    }

    /// Parse the `stats` map. Missing counters are zero.
    pub fn from_map(map: &PackStreamMap) -> Self {
        let count = |key: &str| map.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        let system_updates = count("system-updates");
        Self {
            nodes_created: count("nodes-created"),
            nodes_deleted: count("nodes-deleted"),
            relationships_created: count("relationships-created"),
            relationships_deleted: count("relationships-deleted"),
            properties_set: count("properties-set"),
            labels_added: count("labels-added"),
            labels_removed: count("labels-removed"),
            indexes_added: count("indexes-added"),
            indexes_removed: count("indexes-removed"),
            constraints_added: count("constraints-added"),
            constraints_removed: count("constraints-removed"),
            system_updates,
            contains_system_updates: map
                .get("contains-system-updates")
                .and_then(|v| v.as_bool())
                .unwrap_or(system_updates > 0),
            contains_updates: map
                .get("contains-updates")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

/// Query plan returned in SUCCESS when EXPLAIN or PROFILE is used.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Operator type
    pub operator_type: String,
    /// Operator arguments
    pub arguments: PackStreamMap,
    /// Identifiers introduced by the operator
    pub identifiers: Vec<String>,
    /// Child operators
    pub children: Vec<QueryPlan>,
}

impl QueryPlan {
    /// Parse a `plan` or `profile` map.
    pub fn from_map(map: &PackStreamMap) -> Option<Self> {
        let operator_type = map.get("operatorType")?.as_str()?.to_string();
        let arguments = map
            .get("args")
            .and_then(|v| v.as_map())
            .cloned()
            .unwrap_or_default();
        let identifiers = map
            .get("identifiers")
            .and_then(|v| v.as_string_list())
            .unwrap_or_default();
        let children = map
            .get("children")
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|c| c.as_map().and_then(QueryPlan::from_map))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            operator_type,
            arguments,
            identifiers,
            children,
        })
    }
}

/// Notification returned in SUCCESS metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification code
    pub code: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Severity as reported by the server
    pub severity: String,
    /// Category (5.2+)
    pub category: Option<String>,
    /// Position in query
    pub position: Option<NotificationPosition>,
}

/// Position in query for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPosition {
    /// Line number (1-based)
    pub line: i64,
    /// Column number (1-based)
    pub column: i64,
    /// Offset from start
    pub offset: i64,
}

impl Notification {
    /// Parse from PackStream map.
    pub fn from_map(map: &PackStreamMap) -> Option<Self> {
        let text = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let position = map.get("position").and_then(|v| v.as_map()).and_then(|pos| {
            let line = pos.get("line").and_then(|v| v.as_int())?;
            let column = pos.get("column").and_then(|v| v.as_int())?;
            let offset = pos.get("offset").and_then(|v| v.as_int()).unwrap_or(0);
            Some(NotificationPosition { line, column, offset })
        });

        Some(Self {
            code: text("code")?,
            title: text("title").unwrap_or_default(),
            description: text("description").unwrap_or_default(),
            severity: text("severity").unwrap_or_else(|| "INFORMATION".to_string()),
            category: text("category"),
            position,
        })
    }
}

/// Minimum severity of notifications the server should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMinimumSeverity {
    /// Warnings only
    Warning,
    /// Warnings and information
    Information,
    /// No notifications at all
    Off,
}

impl NotificationMinimumSeverity {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMinimumSeverity::Warning => "WARNING",
            NotificationMinimumSeverity::Information => "INFORMATION",
            NotificationMinimumSeverity::Off => "OFF",
        }
    }
}

/// Notification filter (Bolt 5.2+).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    /// Minimum severity, server default when `None`
    pub minimum_severity: Option<NotificationMinimumSeverity>,
    /// Categories the server should not report
    pub disabled_categories: Option<Vec<String>>,
}

impl NotificationFilter {
    /// Filter that disables every notification.
    pub fn disabled() -> Self {
        Self {
            minimum_severity: Some(NotificationMinimumSeverity::Off),
            disabled_categories: None,
        }
    }

    /// True when the filter leaves the server default in place.
    pub fn is_empty(&self) -> bool {
        self.minimum_severity.is_none() && self.disabled_categories.is_none()
    }

    /// Write the filter into a message's extra map.
    pub fn apply_to(&self, extra: &mut PackStreamMap) {
        if let Some(severity) = self.minimum_severity {
            extra.insert(
                "notifications_minimum_severity".to_string(),
                severity.as_str().into(),
            );
        }
        if let Some(ref categories) = self.disabled_categories {
            extra.insert(
                "notifications_disabled_categories".to_string(),
                PackStreamValue::List(categories.iter().map(|c| c.as_str().into()).collect()),
            );
        }
    }
}

/// Server role in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// Read server
    Read,
    /// Write server
    Write,
    /// Route server (for routing queries)
    Route,
}

impl ServerRole {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Read => "READ",
            ServerRole::Write => "WRITE",
            ServerRole::Route => "ROUTE",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READ" => Some(ServerRole::Read),
            "WRITE" => Some(ServerRole::Write),
            "ROUTE" => Some(ServerRole::Route),
            _ => None,
        }
    }
}

/// Raw routing table as returned by ROUTE or the routing procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    /// Time to live in seconds
    pub ttl: i64,
    /// Database name, absent on servers without multi-database
    pub db: Option<String>,
    /// Servers
    pub servers: Vec<RoutingServer>,
}

/// Server group in a routing table.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingServer {
    /// Server addresses as `host:port`
    pub addresses: Vec<String>,
    /// Server role
    pub role: ServerRole,
}

impl RoutingTable {
    /// Parse the `rt` map of a ROUTE SUCCESS, or a record of the routing
    /// procedure folded into the same shape.
    pub fn from_map(map: &PackStreamMap) -> Result<Self, String> {
        let ttl = map
            .get("ttl")
            .and_then(|v| v.as_int())
            .ok_or("routing table has no ttl")?;
        let db = map.get("db").and_then(|v| v.as_str()).map(str::to_string);
        let servers = map
            .get("servers")
            .and_then(|v| v.as_list())
            .ok_or("routing table has no servers")?
            .iter()
            .map(RoutingServer::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { ttl, db, servers })
    }

    /// Addresses for one role, in server order.
    pub fn addresses(&self, role: ServerRole) -> impl Iterator<Item = &str> {
        self.servers
            .iter()
            .filter(move |s| s.role == role)
            .flat_map(|s| s.addresses.iter().map(String::as_str))
    }
}

impl RoutingServer {
    fn from_value(value: &PackStreamValue) -> Result<Self, String> {
        let map = value.as_map().ok_or("routing server entry must be a map")?;
        let role = map
            .get("role")
            .and_then(|v| v.as_str())
            .ok_or("routing server entry has no role")?;
        let role = ServerRole::parse(role).ok_or_else(|| format!("unknown server role {}", role))?;
        let addresses = map
            .get("addresses")
            .and_then(|v| v.as_string_list())
            .ok_or("routing server addresses must be strings")?;
        Ok(Self { addresses, role })
    }
}
