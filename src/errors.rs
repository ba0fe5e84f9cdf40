//! Error types for the site watcher and the SMS gateway client

use std::fmt;

pub type Result<T> = std::result::Result<T, WatcherError>;

#[derive(Debug)]
pub enum WatcherError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP client setup or request failed
    Http(reqwest::Error),

    /// SMS gateway call failed
    Gateway(GatewayError),

    /// Configuration error
    Config(String),

    /// Site registry could not be read
    Registry(String),

    /// Debounce lock store failure
    LockStore(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for WatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherError::Io(err) => write!(f, "IO error: {}", err),
            WatcherError::Http(err) => write!(f, "HTTP error: {}", err),
            WatcherError::Gateway(err) => write!(f, "Gateway error: {}", err),
            WatcherError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WatcherError::Registry(msg) => write!(f, "Registry error: {}", msg),
            WatcherError::LockStore(msg) => write!(f, "Lock store error: {}", msg),
            WatcherError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for WatcherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatcherError::Io(err) => Some(err),
            WatcherError::Http(err) => Some(err),
            WatcherError::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WatcherError {
    fn from(err: std::io::Error) -> Self {
        WatcherError::Io(err)
    }
}

impl From<reqwest::Error> for WatcherError {
    fn from(err: reqwest::Error) -> Self {
        WatcherError::Http(err)
    }
}

impl From<GatewayError> for WatcherError {
    fn from(err: GatewayError) -> Self {
        WatcherError::Gateway(err)
    }
}

/// Kinds of failure reported by the provider through a nonzero `err_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Auth,
    Timeout,
    AccountBlocked,
    Undefined,
    ApiVersion,
    Arguments,
    UnauthorizedPartner,
    Save,
    ActionRejected,
    Password,
    SessionExpired,
    Generic,
    AccountNotFound,
    NoGate,
    Encoding,
    Balance,
    Spam,
    SenderName,
    Delivery,
    NoLogin,
    DomainBusy,
    TarifNotFound,
    Base,
    MessagesNotDelivery,
    /// Code missing from the provider's published table
    Other(i64),
}

impl ApiErrorKind {
    /// Map a provider error code to its kind. Zero means success and has no kind.
    pub fn from_code(code: i64) -> Option<Self> {
        let kind = match code {
            0 => return None,
            2 => ApiErrorKind::Auth,
            3 => ApiErrorKind::Timeout,
            4 => ApiErrorKind::AccountBlocked,
            5 => ApiErrorKind::Undefined,
            6 => ApiErrorKind::ApiVersion,
            7 => ApiErrorKind::Arguments,
            10 => ApiErrorKind::UnauthorizedPartner,
            11 => ApiErrorKind::Save,
            15 => ApiErrorKind::ActionRejected,
            16 => ApiErrorKind::Password,
            18 => ApiErrorKind::SessionExpired,
            19 => ApiErrorKind::Generic,
            22 => ApiErrorKind::AccountNotFound,
            29 => ApiErrorKind::NoGate,
            35 => ApiErrorKind::Encoding,
            36 => ApiErrorKind::Balance,
            37 | 38 | 59 => ApiErrorKind::Spam,
            39 => ApiErrorKind::SenderName,
            40 => ApiErrorKind::Delivery,
            42 => ApiErrorKind::NoLogin,
            43 => ApiErrorKind::DomainBusy,
            44 | 47 => ApiErrorKind::TarifNotFound,
            45 => ApiErrorKind::Base,
            58 => ApiErrorKind::MessagesNotDelivery,
            other => ApiErrorKind::Other(other),
        };
        Some(kind)
    }

    /// Human readable description used in error messages
    pub fn description(&self) -> String {
        let text = match self {
            ApiErrorKind::Auth => "Authentication failed",
            ApiErrorKind::Timeout => "Gateway timeout",
            ApiErrorKind::AccountBlocked => "Account is blocked",
            ApiErrorKind::Undefined => "Undefined method",
            ApiErrorKind::ApiVersion => "Unsupported API version",
            ApiErrorKind::Arguments => "Invalid arguments",
            ApiErrorKind::UnauthorizedPartner => "Unauthorized partner",
            ApiErrorKind::Save => "Failed to save data",
            ApiErrorKind::ActionRejected => "Action rejected",
            ApiErrorKind::Password => "Invalid password",
            ApiErrorKind::SessionExpired => "Session expired",
            ApiErrorKind::Generic => "Generic gateway error",
            ApiErrorKind::AccountNotFound => "Account not found",
            ApiErrorKind::NoGate => "No gate available for recipient",
            ApiErrorKind::Encoding => "Invalid message encoding",
            ApiErrorKind::Balance => "No money",
            ApiErrorKind::Spam => "Spam",
            ApiErrorKind::SenderName => "Invalid sender name",
            ApiErrorKind::Delivery => "Delivery failed",
            ApiErrorKind::NoLogin => "No login",
            ApiErrorKind::DomainBusy => "Domain busy",
            ApiErrorKind::TarifNotFound => "Tariff not found",
            ApiErrorKind::Base => "Base error",
            ApiErrorKind::MessagesNotDelivery => "Messages not delivered",
            ApiErrorKind::Other(code) => {
                return format!("Communication to API failed. Error code: {}", code);
            }
        };
        text.to_string()
    }

    /// Session-level failures that a fresh login can fix
    pub fn is_session_recoverable(&self) -> bool {
        matches!(self, ApiErrorKind::Timeout | ApiErrorKind::SessionExpired)
    }
}

/// Failure of a single SMS gateway call
#[derive(Debug)]
pub enum GatewayError {
    /// Provider broke the protocol: bad status, unparseable body, missing fields
    Interface(String),

    /// Request never completed at the network level
    Network(reqwest::Error),

    /// Provider answered with a nonzero error code
    Api {
        kind: ApiErrorKind,
        code: i64,
        message: String,
    },
}

impl GatewayError {
    /// Build the typed error for a nonzero provider code
    pub fn from_code(code: i64) -> Option<Self> {
        ApiErrorKind::from_code(code).map(|kind| GatewayError::Api {
            kind,
            code,
            message: kind.description(),
        })
    }

    pub fn kind(&self) -> Option<ApiErrorKind> {
        match self {
            GatewayError::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_session_recoverable(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_session_recoverable())
    }

    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network(_))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Interface(msg) => write!(f, "Interface error: {}", msg),
            GatewayError::Network(err) => write!(f, "Network error: {}", err),
            GatewayError::Api { code, message, .. } => {
                write!(f, "{} (err_code {})", message, code)
            }
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err)
    }
}
