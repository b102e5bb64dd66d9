//! Gateway error envelope and the fixed error codes.

use crate::errors::Error;
use serde::Serialize;
use tracing::error;

/// Amount differs from the product price
pub const INVALID_AMOUNT: i32 = -31001;
/// Order, user or account not found or invalid
pub const INVALID_ACCOUNT: i32 = -31050;
/// Account already paid for the product
pub const ALREADY_PAID: i32 = -31051;
/// Transaction cannot be performed (cancelled, invalid state, internal)
pub const CANT_PERFORM: i32 = -31008;
/// No transaction for the gateway id
pub const TRANSACTION_NOT_FOUND: i32 = -31003;
/// Unknown method
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Authorization failed
pub const INVALID_AUTHORIZATION: i32 = -32504;
/// Body or params could not be decoded
pub const PARSE_ERROR: i32 = -32700;

/// `error` member of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    /// Gateway error code
    pub code: i32,
    /// Human readable message
    pub message: String,
    /// Offending account field, if any
    pub data: Option<String>,
}

impl RpcError {
    /// Builds an error without `data`
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches the offending field name
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Credentials missing or wrong
    #[must_use]
    pub fn invalid_authorization() -> Self {
        Self::new(INVALID_AUTHORIZATION, "Invalid authorization")
    }

    /// Undecodable request or params
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {detail}"))
    }

    /// Method name not in the protocol
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method '{method}' not found"))
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidAccount { field, .. } => Self::new(INVALID_ACCOUNT, message).with_data(field),
            Error::UserNotFound { .. } => Self::new(INVALID_ACCOUNT, message).with_data("user_id"),
            Error::CourseNotFound { .. } => {
                Self::new(INVALID_ACCOUNT, message).with_data("course_id")
            }
            Error::TransactionInProgress { .. } => Self::new(INVALID_ACCOUNT, message),
            Error::InvalidAmount { .. } => Self::new(INVALID_AMOUNT, message),
            Error::AlreadyPaid { .. } => Self::new(ALREADY_PAID, message),
            Error::TransactionNotFound { .. } => Self::new(TRANSACTION_NOT_FOUND, message),
            Error::TransactionCancelled { .. } => Self::new(CANT_PERFORM, message),
            internal => {
                error!("Internal error while handling gateway call: {}", internal);
                Self::new(CANT_PERFORM, "Unable to perform operation")
            }
        }
    }
}
