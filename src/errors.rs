//! Unified error type for course-keeper.
//!
//! Infrastructure failures (database, HTTP, configuration) and payment-domain
//! rejections share one enum so core functions can return a single `Result`.
//! The webhook layer decides which variants become gateway error codes.

use thiserror::Error;

/// Every failure the crate can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// I/O failure (config files, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Outbound HTTP failure
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram answered with `ok: false`
    #[error("Telegram API error in {method}: {description}")]
    Telegram {
        /// Bot API method that failed
        method: String,
        /// Description returned by Telegram
        description: String,
    },

    /// Account reference is missing or not a positive integer
    #[error("Invalid account: {reason}")]
    InvalidAccount {
        /// Account field that failed to parse
        field: &'static str,
        /// Human readable reason
        reason: String,
    },

    /// No user record for the referenced account
    #[error("User not found: {user_id}")]
    UserNotFound {
        /// Requested user id
        user_id: i64,
    },

    /// No course with the given id
    #[error("Course not found: {course_id}")]
    CourseNotFound {
        /// Requested course id
        course_id: i64,
    },

    /// Paid amount differs from the product price
    #[error("Invalid amount: expected {expected}, received {received}")]
    InvalidAmount {
        /// Product price in minor units
        expected: i64,
        /// Amount sent by the gateway
        received: i64,
    },

    /// The account already owns a performed transaction for the product
    #[error("User {user_id} already paid")]
    AlreadyPaid {
        /// Paying user
        user_id: i64,
    },

    /// Another gateway transaction holds the pending slot for this account
    #[error("Another transaction in progress for user {user_id}")]
    TransactionInProgress {
        /// Paying user
        user_id: i64,
    },

    /// No transaction bound to the gateway id
    #[error("Transaction not found: {gateway_id}")]
    TransactionNotFound {
        /// Gateway transaction id
        gateway_id: String,
    },

    /// The transaction is cancelled and can no longer move
    #[error("Transaction {gateway_id} is cancelled")]
    TransactionCancelled {
        /// Gateway transaction id
        gateway_id: String,
    },
}

impl Error {
    /// Returns true for rejections produced by payment validation rather
    /// than by infrastructure failures.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidAccount { .. }
                | Self::UserNotFound { .. }
                | Self::CourseNotFound { .. }
                | Self::InvalidAmount { .. }
                | Self::AlreadyPaid { .. }
                | Self::TransactionInProgress { .. }
                | Self::TransactionNotFound { .. }
                | Self::TransactionCancelled { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
