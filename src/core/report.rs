//! Report generation business logic.
//!
//! This module provides payment statistics and transaction history for the
//! admin side of the bot. All functions are read-only and return structured
//! data that the presentation layer formats.

use crate::{
    core::transaction,
    entities::{PaymentTransaction, TransactionState, payment_transaction},
    errors::Result,
};
use sea_orm::{ConnectionTrait, PaginatorTrait, QuerySelect, prelude::*, sea_query::Expr};

/// Aggregated payment counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentStats {
    /// All transactions ever created
    pub total: u64,
    /// Successfully paid
    pub performed: u64,
    /// Created or waiting for `PerformTransaction`
    pub pending: u64,
    /// Cancelled before payment
    pub cancelled: u64,
    /// Cancelled after payment
    pub reversed: u64,
    /// Sum of performed amounts in minor units
    pub total_amount: i64,
}

async fn count_in_states<C>(db: &C, states: &[TransactionState]) -> Result<u64>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(
            payment_transaction::Column::State
                .is_in(states.iter().map(|state| state.code())),
        )
        .count(db)
        .await
        .map_err(Into::into)
}

/// Computes the payment counters shown on the admin statistics screen.
pub async fn payment_stats<C>(db: &C) -> Result<PaymentStats>
where
    C: ConnectionTrait,
{
    let total = PaymentTransaction::find().count(db).await?;
    let performed = count_in_states(db, &[TransactionState::Performed]).await?;
    let pending = count_in_states(
        db,
        &[TransactionState::Created, TransactionState::Pending],
    )
    .await?;
    let cancelled = count_in_states(db, &[TransactionState::Cancelled]).await?;
    let reversed = count_in_states(db, &[TransactionState::Reversed]).await?;

    let total_amount: Option<i64> = PaymentTransaction::find()
        .select_only()
        .column_as(Expr::col(payment_transaction::Column::Amount).sum(), "total_amount")
        .filter(payment_transaction::Column::State.eq(TransactionState::Performed.code()))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();

    Ok(PaymentStats {
        total,
        performed,
        pending,
        cancelled,
        reversed,
        total_amount: total_amount.unwrap_or(0),
    })
}

/// Most recent transactions, newest first.
pub async fn recent_transactions<C>(db: &C, limit: u64) -> Result<Vec<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    transaction::list_recent(db, limit).await
}

/// Every transaction of one user, newest first.
pub async fn user_payment_history<C>(
    db: &C,
    user_id: i64,
) -> Result<Vec<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    transaction::list_for_user(db, user_id).await
}

/// Formats minor units as a decimal amount, e.g. `9700000` -> `"97 000.00"`.
#[must_use]
pub fn format_amount(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    let (major, minor) = (abs / 100, abs % 100);

    let digits = major.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{minor:02}")
}

/// Short human readable state label.
#[must_use]
pub const fn state_label(state: TransactionState) -> &'static str {
    match state {
        TransactionState::Created => "created",
        TransactionState::Pending => "pending",
        TransactionState::Performed => "paid",
        TransactionState::Cancelled => "cancelled",
        TransactionState::Reversed => "refunded",
    }
}

/// Generates a summary line for a transaction.
#[must_use]
pub fn format_transaction_summary(tx: &payment_transaction::Model) -> String {
    format!(
        "{} | {} | user {} | {}",
        format_amount(tx.amount),
        state_label(tx.current_state()),
        tx.user_id,
        tx.created_at.format("%Y-%m-%d %H:%M")
    )
}
