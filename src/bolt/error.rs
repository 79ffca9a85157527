//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::handshake::BoltVersion;
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Debug)]
pub enum BoltError {
    /// I/O error
    Io(io::Error),

    /// Handshake error
    Handshake(HandshakeError),

    /// PackStream serialization error
    PackStream(PackStreamError),

    /// Protocol error (unexpected message, out-of-order response, etc.)
    Protocol(String),

    /// Feature not available on the negotiated version. Raised before any
    /// bytes are written.
    FeatureNotSupported {
        /// Feature name
        feature: &'static str,
        /// Negotiated version
        version: BoltVersion,
    },

    /// Message too large
    MessageTooLarge {
        /// Size of the offending message in bytes
        size: usize,
        /// Configured limit in bytes
        max: usize,
    },

    /// Timeout error
    Timeout,

    /// Connection closed by the peer
    ConnectionClosed,
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::FeatureNotSupported { feature, version } => {
                write!(f, "{} is not supported by Bolt {}", feature, version)
            }
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::Timeout => write!(f, "Operation timed out"),
            BoltError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl BoltError {
    /// Whether the connection that produced this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BoltError::FeatureNotSupported { .. }
                | BoltError::PackStream(PackStreamError::Packing(_))
                | BoltError::PackStream(PackStreamError::UnsupportedType { .. })
        )
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        BoltError::Io(err)
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Server accepted none of the proposed versions
    NoCompatibleVersion,

    /// Server picked a version that was never proposed
    UnsupportedVersion(u32),

    /// Reply is not a Bolt handshake (wrong size, HTTP server, etc.)
    InvalidData(String),

    /// Connection closed during handshake
    ConnectionClosed,

    /// Handshake timeout
    Timeout,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NoCompatibleVersion => {
                write!(f, "No compatible protocol version found")
            }
            HandshakeError::UnsupportedVersion(v) => {
                write!(f, "Server selected unsupported version 0x{:08X}", v)
            }
            HandshakeError::InvalidData(msg) => {
                write!(f, "Invalid handshake data: {}", msg)
            }
            HandshakeError::ConnectionClosed => {
                write!(f, "Connection closed during handshake")
            }
            HandshakeError::Timeout => {
                write!(f, "Handshake timed out")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// 서버 FAILURE 메시지의 에러 코드 상수
///
/// 재시도 분류와 라우팅 테이블 갱신 판단에 사용됩니다.
pub struct BoltErrorCode;

impl BoltErrorCode {
    // Security
    /// Credentials were rejected.
    pub const AUTHENTICATION_FAILED: &'static str = "Neo.ClientError.Security.AuthenticationFailed";
    /// The auth token expired; the connection must be reauthenticated.
    pub const TOKEN_EXPIRED: &'static str = "Neo.ClientError.Security.TokenExpired";
    /// Cached authorization expired on the server.
    pub const AUTHORIZATION_EXPIRED: &'static str = "Neo.ClientError.Security.AuthorizationExpired";

    // Cluster
    /// The server is no longer the writer for the database.
    pub const NOT_A_LEADER: &'static str = "Neo.ClientError.Cluster.NotALeader";
    /// A write reached a read-only member.
    pub const FORBIDDEN_ON_READ_ONLY_DATABASE: &'static str =
        "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";
    /// The named database does not exist.
    pub const DATABASE_NOT_FOUND: &'static str = "Neo.ClientError.Database.DatabaseNotFound";

    // Statement / transaction
    /// Query did not parse.
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
    /// A bookmark was malformed or unknown to the server.
    pub const INVALID_BOOKMARK: &'static str = "Neo.ClientError.Transaction.InvalidBookmark";

    // Transient errors that must not be retried
    /// Transaction was terminated by an operator.
    pub const TRANSACTION_TERMINATED: &'static str = "Neo.TransientError.Transaction.Terminated";
    /// Lock client stopped because the transaction was terminated.
    pub const LOCK_CLIENT_STOPPED: &'static str =
        "Neo.TransientError.Transaction.LockClientStopped";

    // Transient errors (retry may succeed)
    /// Deadlock between concurrent transactions.
    pub const DEADLOCK_DETECTED: &'static str = "Neo.TransientError.Transaction.DeadlockDetected";
    /// Database is temporarily unavailable.
    pub const DATABASE_UNAVAILABLE: &'static str =
        "Neo.TransientError.General.DatabaseUnavailable";

    /// Prefix shared by all transient server errors.
    pub const TRANSIENT_PREFIX: &'static str = "Neo.TransientError.";
    /// Prefix shared by all security errors.
    pub const SECURITY_PREFIX: &'static str = "Neo.ClientError.Security.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_display() {
        let err = HandshakeError::UnsupportedVersion(0x0000_0106);
        assert!(err.to_string().contains("0x00000106"));

        let err = HandshakeError::NoCompatibleVersion;
        assert!(err.to_string().contains("No compatible"));
    }

    #[test]
    fn test_bolt_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let bolt_err: BoltError = io_err.into();
        assert!(matches!(bolt_err, BoltError::Io(_)));
        assert!(bolt_err.is_fatal());
    }

    #[test]
    fn test_local_errors_are_not_fatal() {
        let err = BoltError::FeatureNotSupported {
            feature: "impersonation",
            version: BoltVersion::V4_3,
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "impersonation is not supported by Bolt 4.3");

        let err: BoltError = PackStreamError::Packing("Node".into()).into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_bolt_error_codes() {
        assert!(BoltErrorCode::DEADLOCK_DETECTED.starts_with(BoltErrorCode::TRANSIENT_PREFIX));
        assert!(BoltErrorCode::TOKEN_EXPIRED.starts_with(BoltErrorCode::SECURITY_PREFIX));
    }
}
