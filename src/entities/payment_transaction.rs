//! Payment transaction entity - One row per gateway payment attempt.
//!
//! Rows are created by `CreateTransaction` and only ever move forward through
//! the states described by [`TransactionState`]. `order_id` is generated
//! locally, `gateway_transaction_id` is the id the gateway uses in every
//! follow-up call. Both are unique.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    /// Row id
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Locally generated order identifier, returned to the gateway as `transaction`
    #[sea_orm(unique)]
    pub order_id: String,
    /// Gateway transaction id, set when the gateway registers the order
    #[sea_orm(unique)]
    pub gateway_transaction_id: Option<String>,
    /// Paying account (Telegram chat id)
    #[sea_orm(indexed)]
    pub user_id: i64,
    /// Purchased course, `None` for the default product
    pub course_id: Option<i64>,
    /// Amount in minor currency units
    pub amount: i64,
    /// Raw state code, see [`TransactionState`]
    pub state: i32,
    /// Gateway cancellation reason
    pub reason: Option<i32>,
    /// When the row was created
    pub created_at: DateTimeUtc,
    /// When the payment was performed
    pub perform_time: Option<DateTimeUtc>,
    /// When the payment was cancelled
    pub cancel_time: Option<DateTimeUtc>,
}

impl Model {
    /// Decodes the stored state code.
    ///
    /// Unknown codes are treated as cancelled so a corrupt row can never be
    /// performed.
    #[must_use]
    pub fn current_state(&self) -> TransactionState {
        TransactionState::from_code(self.state).unwrap_or(TransactionState::Cancelled)
    }
}

/// Transactions have no declared relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle of a payment transaction.
///
/// `Performed`, `Cancelled` and `Reversed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created locally, no gateway id bound yet
    Created,
    /// Gateway id bound, waiting for `PerformTransaction`
    Pending,
    /// Paid
    Performed,
    /// Cancelled before it was performed
    Cancelled,
    /// Cancelled after it was performed (refund)
    Reversed,
}

impl TransactionState {
    /// Gateway state code
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Created => 0,
            Self::Pending => 1,
            Self::Performed => 2,
            Self::Cancelled => -1,
            Self::Reversed => -2,
        }
    }

    /// Parses a gateway state code
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Created),
            1 => Some(Self::Pending),
            2 => Some(Self::Performed),
            -1 => Some(Self::Cancelled),
            -2 => Some(Self::Reversed),
            _ => None,
        }
    }

    /// True for `Cancelled` and `Reversed`
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled | Self::Reversed)
    }

    /// True for states no transition may leave
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Performed | Self::Cancelled | Self::Reversed)
    }

    /// State a cancellation moves this state into
    #[must_use]
    pub const fn cancelled_state(self) -> Self {
        match self {
            Self::Performed | Self::Reversed => Self::Reversed,
            Self::Created | Self::Pending | Self::Cancelled => Self::Cancelled,
        }
    }
}
