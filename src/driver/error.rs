//! Driver Error Types
//!
//! 드라이버 에러 정의. 모든 에러는 [`DriverError::code`]로 안정적인
//! 기계 판독용 코드를 제공합니다.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::bolt::{BoltError, BoltErrorCode, BoltVersion, FailureMessage, HandshakeError, PackStreamError};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 핸드셰이크 실패 (연결 사용 불가)
    #[error("Handshake failed: {0}")]
    Handshake(HandshakeError),

    /// 구조체 필드 수 불일치
    #[error("Malformed structure 0x{tag:02X}: expected {expected} fields, received {actual}")]
    MalformedStructure {
        /// 구조체 태그
        tag: u8,
        /// 기대 필드 수
        expected: usize,
        /// 실제 필드 수
        actual: usize,
    },

    /// 파라미터로 보낼 수 없는 값
    #[error("Packing error: {0}")]
    Packing(String),

    /// 협상된 버전에서 표현할 수 없는 타입
    #[error("{type_name} is not supported by Bolt {version}")]
    UnsupportedType {
        /// 값 타입
        type_name: &'static str,
        /// 협상된 버전
        version: String,
    },

    /// 협상된 버전에서 지원하지 않는 기능 (네트워크 전송 없음)
    #[error("{feature} is not supported by Bolt {version}")]
    FeatureNotSupported {
        /// 기능 이름
        feature: &'static str,
        /// 협상된 버전
        version: BoltVersion,
    },

    /// 연결 실패 (연결은 폐기됨)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(ServerError),

    /// 서버 FAILURE
    #[error("Server error: {0}")]
    Server(ServerError),

    /// 라우팅 테이블 만료 (강제 갱신 필요)
    #[error("Routing table for database '{0}' has expired")]
    RoutingTableExpired(String),

    /// 쓰기 서버 없음
    #[error("No writers available for database '{0}'")]
    NoWritersAvailable(String),

    /// 읽기 서버 없음
    #[error("No readers available for database '{0}'")]
    NoReadersAvailable(String),

    /// 서비스 불가
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 세션 만료 (서버가 더 이상 해당 역할이 아님)
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 재시도 시간 초과
    #[error("Retries exhausted after {attempts} attempts in {elapsed:?}: {last}")]
    RetryTimeout {
        /// 시도 횟수
        attempts: u32,
        /// 경과 시간
        elapsed: Duration,
        /// 마지막 원인
        #[source]
        last: Box<DriverError>,
    },

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 트랜잭션/결과 사용 에러
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 실패 에러 생성
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 트랜잭션 에러 생성
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 서버 에러 생성
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerError::new(code, message).into()
    }

    /// 안정적인 기계 판독용 에러 코드. 서버 에러는 서버 코드를 그대로 사용.
    pub fn code(&self) -> &str {
        match self {
            Self::Handshake(_) => "HandshakeError",
            Self::MalformedStructure { .. } => "MalformedStructure",
            Self::Packing(_) => "PackingError",
            Self::UnsupportedType { .. } => "UnsupportedTypeError",
            Self::FeatureNotSupported { .. } => "FeatureNotSupportedError",
            Self::ConnectionFailed(_) | Self::Io(_) => "ConnectionFailedError",
            Self::Protocol(_) => "ProtocolError",
            Self::Authentication(e) | Self::Server(e) => &e.code,
            Self::RoutingTableExpired(_) => "RoutingTableExpiredError",
            Self::NoWritersAvailable(_) => "NoWritersAvailable",
            Self::NoReadersAvailable(_) => "NoReadersAvailable",
            Self::ServiceUnavailable(_) => "ServiceUnavailable",
            Self::SessionExpired(_) => "SessionExpired",
            Self::RetryTimeout { .. } => "RetryTimeoutError",
            Self::Timeout(_) => "Timeout",
            Self::Configuration(_) => "ConfigurationError",
            Self::TypeConversion(_) => "TypeConversionError",
            Self::Transaction(_) => "TransactionError",
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_)
            | Self::Io(_)
            | Self::ServiceUnavailable(_)
            | Self::SessionExpired(_)
            | Self::RoutingTableExpired(_)
            | Self::NoWritersAvailable(_)
            | Self::NoReadersAvailable(_)
            | Self::Timeout(_) => true,
            Self::Server(e) => e.is_transient(),
            _ => false,
        }
    }

    /// 서버에 도달할 수 없음을 나타내는 에러 여부 (주소 제거 대상)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Io(_) | Self::ServiceUnavailable(_) | Self::SessionExpired(_)
        )
    }

    /// 쓰기 서버가 더 이상 리더가 아님을 나타내는 에러 여부
    pub fn is_writer_lost(&self) -> bool {
        match self {
            Self::Server(e) => {
                e.code == BoltErrorCode::NOT_A_LEADER
                    || e.code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY_DATABASE
            }
            _ => false,
        }
    }

    /// 이 에러 이후 연결을 재사용할 수 없는지 여부
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_)
                | Self::MalformedStructure { .. }
                | Self::ConnectionFailed(_)
                | Self::Protocol(_)
                | Self::Io(_)
                | Self::Timeout(_)
        )
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// ServerError - 서버 FAILURE 메시지
// ============================================================================

/// 서버 에러
///
/// 에러 코드는 "Neo.{Classification}.{Category}.{Title}" 형식을 따릅니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// 에러 코드
    pub code: String,
    /// 에러 메시지
    pub message: String,
}

impl ServerError {
    /// 새 에러 생성
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 분류 (ClientError, TransientError, DatabaseError)
    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("")
    }

    /// 트랜지언트 에러 여부 (재시도 가능)
    ///
    /// Terminated, LockClientStopped는 사용자가 중단한 트랜잭션이므로 제외.
    /// NotALeader, ForbiddenOnReadOnlyDatabase는 리더 변경 중이므로 포함.
    pub fn is_transient(&self) -> bool {
        if self.code.starts_with(BoltErrorCode::TRANSIENT_PREFIX) {
            return self.code != BoltErrorCode::TRANSACTION_TERMINATED
                && self.code != BoltErrorCode::LOCK_CLIENT_STOPPED;
        }
        self.code == BoltErrorCode::NOT_A_LEADER
            || self.code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY_DATABASE
    }

    /// 보안 에러 여부
    pub fn is_security_error(&self) -> bool {
        self.code.starts_with(BoltErrorCode::SECURITY_PREFIX)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

impl From<ServerError> for DriverError {
    fn from(err: ServerError) -> Self {
        if err.is_security_error() {
            DriverError::Authentication(err)
        } else {
            DriverError::Server(err)
        }
    }
}

impl From<FailureMessage> for DriverError {
    fn from(msg: FailureMessage) -> Self {
        ServerError::new(msg.code, msg.message).into()
    }
}

// ============================================================================
// Wire error conversion
// ============================================================================

impl From<PackStreamError> for DriverError {
    fn from(err: PackStreamError) -> Self {
        match err {
            PackStreamError::MalformedStructure { tag, expected, actual } => {
                DriverError::MalformedStructure { tag, expected, actual }
            }
            PackStreamError::Packing(msg) => DriverError::Packing(msg),
            PackStreamError::UnsupportedType { type_name, version } => {
                DriverError::UnsupportedType { type_name, version }
            }
            other => DriverError::Protocol(other.to_string()),
        }
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Io(e) => DriverError::Io(e),
            BoltError::Handshake(e) => DriverError::Handshake(e),
            BoltError::PackStream(e) => e.into(),
            BoltError::Protocol(msg) => DriverError::Protocol(msg),
            BoltError::FeatureNotSupported { feature, version } => {
                DriverError::FeatureNotSupported { feature, version }
            }
            e @ BoltError::MessageTooLarge { .. } => DriverError::Protocol(e.to_string()),
            BoltError::Timeout => DriverError::Timeout("read timed out".to_string()),
            BoltError::ConnectionClosed => {
                DriverError::ConnectionFailed("connection closed by server".to_string())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
