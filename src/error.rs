//! Request-path failures and the business error catalogue.
//!
//! # Taxonomy
//! - [`BusinessError`]: expected failure with a business code, a transport
//!   status and a message that is safe to show the caller.
//! - [`AppError::Unexpected`]: anything else. Resolved as 500/500, logged
//!   with its stack, redacted in production.
//!
//! Both are turned into an [`ErrorReport`] stashed in the response
//! extensions; the normalizer builds the envelope and logs it from there.

use std::backtrace::Backtrace;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Numeric business codes.
///
/// 1xxx general, 2xxx user, 3xxx resource, 4xxx business logic,
/// 5xxx external services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 1000,
    UnknownError = 1001,
    ValidationError = 1002,
    Unauthorized = 1003,
    Forbidden = 1004,
    NotFound = 1005,
    MethodNotAllowed = 1006,
    RequestTimeout = 1007,
    Conflict = 1008,
    TooManyRequests = 1009,
    InternalServerError = 1010,
    ServiceUnavailable = 1011,

    UserNotFound = 2001,
    UserAlreadyExists = 2002,
    InvalidPassword = 2003,
    UserDisabled = 2004,
    UserLocked = 2005,
    InvalidToken = 2006,
    TokenExpired = 2007,
    TokenMissing = 2008,
    InvalidCredentials = 2009,
    PasswordTooWeak = 2010,
    PasswordSameAsOld = 2011,
    EmailAlreadyVerified = 2012,
    EmailNotVerified = 2013,

    ResourceNotFound = 3001,
    ResourceAlreadyExists = 3002,
    ResourceLocked = 3003,
    ResourceDeleted = 3004,
    ResourceExpired = 3005,
    InsufficientResources = 3006,
    ResourceInUse = 3007,

    BusinessLogicError = 4001,
    InsufficientBalance = 4002,
    InvalidOperation = 4003,
    OperationNotAllowed = 4004,
    DuplicateOperation = 4005,
    DependencyError = 4006,
    InvalidState = 4007,
    QuotaExceeded = 4008,
    InvalidAmount = 4009,
    InvalidQuantity = 4010,
    InvalidStatus = 4011,

    ExternalServiceError = 5001,
    DatabaseError = 5002,
    RedisError = 5003,
    NetworkError = 5004,
    TimeoutError = 5005,
    PaymentError = 5006,
    SmsError = 5007,
    EmailError = 5008,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Default caller-facing message.
    pub fn default_message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Success => "operation succeeded",
            UnknownError => "unknown error",
            ValidationError => "parameter validation failed",
            Unauthorized => "unauthorized, please sign in",
            Forbidden => "access forbidden",
            NotFound => "resource does not exist",
            MethodNotAllowed => "request method not allowed",
            RequestTimeout => "request timed out",
            Conflict => "resource conflict",
            TooManyRequests => "too many requests, please retry later",
            InternalServerError => "internal server error",
            ServiceUnavailable => "service temporarily unavailable",

            UserNotFound => "user does not exist",
            UserAlreadyExists => "user already exists",
            InvalidPassword => "wrong password",
            UserDisabled => "user is disabled",
            UserLocked => "user is locked",
            InvalidToken => "invalid token",
            TokenExpired => "token expired",
            TokenMissing => "token missing",
            InvalidCredentials => "wrong username or password",
            PasswordTooWeak => "password is too weak",
            PasswordSameAsOld => "new password must differ from the old one",
            EmailAlreadyVerified => "email already verified",
            EmailNotVerified => "email not verified",

            ResourceNotFound => "resource does not exist",
            ResourceAlreadyExists => "resource already exists",
            ResourceLocked => "resource is locked",
            ResourceDeleted => "resource has been deleted",
            ResourceExpired => "resource has expired",
            InsufficientResources => "insufficient resources",
            ResourceInUse => "resource is in use",

            BusinessLogicError => "business logic error",
            InsufficientBalance => "insufficient balance",
            InvalidOperation => "invalid operation",
            OperationNotAllowed => "operation not allowed",
            DuplicateOperation => "duplicate operation",
            DependencyError => "dependency error",
            InvalidState => "invalid state",
            QuotaExceeded => "quota exceeded",
            InvalidAmount => "invalid amount",
            InvalidQuantity => "invalid quantity",
            InvalidStatus => "invalid status",

            ExternalServiceError => "external service error",
            DatabaseError => "database error",
            RedisError => "cache service error",
            NetworkError => "network error",
            TimeoutError => "upstream timed out",
            PaymentError => "payment service error",
            SmsError => "sms service error",
            EmailError => "email service error",
        }
    }

    /// Transport status used when the caller does not pick one.
    pub fn default_status(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            Success => StatusCode::OK,
            Unauthorized | InvalidToken | TokenExpired | TokenMissing | InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Forbidden | UserDisabled | UserLocked | OperationNotAllowed => StatusCode::FORBIDDEN,
            NotFound | UserNotFound | ResourceNotFound | ResourceDeleted => StatusCode::NOT_FOUND,
            MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Conflict | UserAlreadyExists | ResourceAlreadyExists | ResourceLocked
            | ResourceInUse | DuplicateOperation => StatusCode::CONFLICT,
            ResourceExpired => StatusCode::GONE,
            TooManyRequests | QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            TimeoutError => StatusCode::GATEWAY_TIMEOUT,
            UnknownError | InternalServerError | ExternalServiceError | DatabaseError
            | RedisError | NetworkError | PaymentError | SmsError | EmailError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// An expected failure whose message is safe to surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BusinessError {
    pub kind: ErrorCode,
    pub status: StatusCode,
    pub message: String,
}

impl BusinessError {
    /// Error with the code's default status and message.
    pub fn new(kind: ErrorCode) -> Self {
        Self {
            kind,
            status: kind.default_status(),
            message: kind.default_message().to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.as_u16()
    }

    fn of(kind: ErrorCode, status: StatusCode, message: Option<String>) -> Self {
        Self {
            kind,
            status,
            message: message.unwrap_or_else(|| kind.default_message().to_string()),
        }
    }

    pub fn unauthorized(message: Option<String>) -> Self {
        Self::of(ErrorCode::Unauthorized, StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: Option<String>) -> Self {
        Self::of(ErrorCode::Forbidden, StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: Option<String>) -> Self {
        Self::of(ErrorCode::NotFound, StatusCode::NOT_FOUND, message)
    }

    pub fn validation(message: Option<String>) -> Self {
        Self::of(ErrorCode::ValidationError, StatusCode::BAD_REQUEST, message)
    }

    pub fn user_not_found(message: Option<String>) -> Self {
        Self::of(ErrorCode::UserNotFound, StatusCode::NOT_FOUND, message)
    }

    pub fn user_already_exists(message: Option<String>) -> Self {
        Self::of(ErrorCode::UserAlreadyExists, StatusCode::CONFLICT, message)
    }

    pub fn invalid_password(message: Option<String>) -> Self {
        Self::of(ErrorCode::InvalidPassword, StatusCode::BAD_REQUEST, message)
    }

    pub fn insufficient_balance(message: Option<String>) -> Self {
        Self::of(ErrorCode::InsufficientBalance, StatusCode::BAD_REQUEST, message)
    }

    pub fn resource_not_found(message: Option<String>) -> Self {
        Self::of(ErrorCode::ResourceNotFound, StatusCode::NOT_FOUND, message)
    }

    pub fn resource_already_exists(message: Option<String>) -> Self {
        Self::of(ErrorCode::ResourceAlreadyExists, StatusCode::CONFLICT, message)
    }

    pub fn invalid_operation(message: Option<String>) -> Self {
        Self::of(ErrorCode::InvalidOperation, StatusCode::BAD_REQUEST, message)
    }

    pub fn external_service(message: Option<String>) -> Self {
        Self::of(ErrorCode::ExternalServiceError, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn database(message: Option<String>) -> Self {
        Self::of(ErrorCode::DatabaseError, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn redis(message: Option<String>) -> Self {
        Self::of(ErrorCode::RedisError, StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Failure type returned by handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Business(#[from] BusinessError),

    /// Any other failure. `stack` is captured where the error was converted.
    #[error("{error:#}")]
    Unexpected { error: anyhow::Error, stack: String },
}

impl AppError {
    pub fn unexpected(error: impl Into<anyhow::Error>) -> Self {
        AppError::Unexpected {
            error: error.into(),
            stack: Backtrace::force_capture().to_string(),
        }
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::unexpected(anyhow::Error::msg(message))
    }

    pub fn report(&self) -> ErrorReport {
        match self {
            AppError::Business(e) => ErrorReport {
                kind: FailureKind::Business,
                status: e.status,
                code: e.code(),
                message: e.message.clone(),
                stack: None,
            },
            AppError::Unexpected { error, stack } => ErrorReport::unexpected(
                format!("{:#}", error),
                Some(stack.clone()),
            ),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::unexpected(error)
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::unexpected(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::unexpected(error)
    }
}

/// How a failure was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Business,
    Unexpected,
    /// Rejected by the framework (unknown route, bad body, timeout).
    Http,
}

/// The resolved failure, carried in response extensions to the normalizer.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: FailureKind,
    pub status: StatusCode,
    pub code: u16,
    pub message: String,
    /// Server-side only. Never serialized into a response.
    pub stack: Option<String>,
}

impl ErrorReport {
    pub fn unexpected(message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            kind: FailureKind::Unexpected,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: message.into(),
            stack,
        }
    }

    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Http,
            status,
            code: status.as_u16(),
            message: message.into(),
            stack: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();
        // bare body for routers without the normalizer
        let body = json!({
            "success": false,
            "code": report.code,
            "message": report.message,
            "data": null,
        });
        let mut response = (report.status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

impl IntoResponse for BusinessError {
    fn into_response(self) -> Response {
        AppError::Business(self).into_response()
    }
}
