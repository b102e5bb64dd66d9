//! Transaction store - Persistence for payment transactions.
//!
//! All reads and writes of the `payment_transactions` table live here. State
//! changes are conditional updates (`... WHERE state = <expected>`) that report
//! whether they applied, so two concurrent gateway calls can never both move
//! the same row. The state machine in [`crate::core::payment`] is the only
//! caller of the write functions.

use crate::{
    entities::{PaymentTransaction, TransactionState, payment_transaction},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, PaginatorTrait, QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

/// Matches rows for the given product slot. `None` is the default product.
fn course_filter(course_id: Option<i64>) -> sea_orm::sea_query::SimpleExpr {
    match course_id {
        Some(id) => payment_transaction::Column::CourseId.eq(id),
        None => payment_transaction::Column::CourseId.is_null(),
    }
}

/// Finds the transaction bound to a gateway transaction id.
pub async fn find_by_gateway_id<C>(
    db: &C,
    gateway_id: &str,
) -> Result<Option<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::GatewayTransactionId.eq(gateway_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a transaction by its local order id.
pub async fn find_by_order_id<C>(
    db: &C,
    order_id: &str,
) -> Result<Option<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::OrderId.eq(order_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the newest non-terminal transaction holding an account's product slot.
pub async fn find_pending<C>(
    db: &C,
    user_id: i64,
    course_id: Option<i64>,
) -> Result<Option<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::UserId.eq(user_id))
        .filter(course_filter(course_id))
        .filter(payment_transaction::Column::State.is_in([
            TransactionState::Created.code(),
            TransactionState::Pending.code(),
        ]))
        .order_by_desc(payment_transaction::Column::CreatedAt)
        .order_by_desc(payment_transaction::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns true if the account has a performed transaction for the product.
pub async fn has_successful_payment<C>(db: &C, user_id: i64, course_id: Option<i64>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let count = PaymentTransaction::find()
        .filter(payment_transaction::Column::UserId.eq(user_id))
        .filter(course_filter(course_id))
        .filter(payment_transaction::Column::State.eq(TransactionState::Performed.code()))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Inserts a new transaction in state `Created` with a fresh order id.
pub async fn insert_created<C>(
    db: &C,
    user_id: i64,
    course_id: Option<i64>,
    amount: i64,
) -> Result<payment_transaction::Model>
where
    C: ConnectionTrait,
{
    let model = payment_transaction::ActiveModel {
        order_id: Set(Uuid::new_v4().simple().to_string()),
        gateway_transaction_id: Set(None),
        user_id: Set(user_id),
        course_id: Set(course_id),
        amount: Set(amount),
        state: Set(TransactionState::Created.code()),
        reason: Set(None),
        created_at: Set(crate::core::now_millis()),
        perform_time: Set(None),
        cancel_time: Set(None),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Binds a gateway id to a `Created` transaction, moving it to `Pending`.
///
/// Returns false if the row was no longer in `Created`.
pub async fn bind_gateway_id<C>(db: &C, id: i64, gateway_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = PaymentTransaction::update_many()
        .col_expr(
            payment_transaction::Column::GatewayTransactionId,
            Expr::value(gateway_id),
        )
        .col_expr(
            payment_transaction::Column::State,
            Expr::value(TransactionState::Pending.code()),
        )
        .filter(payment_transaction::Column::Id.eq(id))
        .filter(payment_transaction::Column::State.eq(TransactionState::Created.code()))
        .filter(payment_transaction::Column::GatewayTransactionId.is_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Moves a `Pending` transaction to `Performed`.
///
/// Returns false if another call already moved the row.
pub async fn mark_performed<C>(db: &C, id: i64, perform_time: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = PaymentTransaction::update_many()
        .col_expr(
            payment_transaction::Column::State,
            Expr::value(TransactionState::Performed.code()),
        )
        .col_expr(
            payment_transaction::Column::PerformTime,
            Expr::value(perform_time),
        )
        .filter(payment_transaction::Column::Id.eq(id))
        .filter(payment_transaction::Column::State.eq(TransactionState::Pending.code()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Cancels a transaction that is still in `from`.
///
/// The target state is derived from `from`: performed transactions become
/// `Reversed`, everything else `Cancelled`. Returns false if the row left
/// `from` in the meantime.
pub async fn mark_cancelled<C>(
    db: &C,
    id: i64,
    from: TransactionState,
    reason: Option<i32>,
    cancel_time: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = PaymentTransaction::update_many()
        .col_expr(
            payment_transaction::Column::State,
            Expr::value(from.cancelled_state().code()),
        )
        .col_expr(payment_transaction::Column::Reason, Expr::value(reason))
        .col_expr(
            payment_transaction::Column::CancelTime,
            Expr::value(cancel_time),
        )
        .filter(payment_transaction::Column::Id.eq(id))
        .filter(payment_transaction::Column::State.eq(from.code()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Performed transactions whose `perform_time` lies in `[from, to]`, oldest first.
pub async fn performed_between<C>(
    db: &C,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::State.eq(TransactionState::Performed.code()))
        .filter(payment_transaction::Column::PerformTime.between(from, to))
        .order_by_asc(payment_transaction::Column::PerformTime)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All transactions of a user, newest first.
pub async fn list_for_user<C>(db: &C, user_id: i64) -> Result<Vec<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::UserId.eq(user_id))
        .order_by_desc(payment_transaction::Column::CreatedAt)
        .order_by_desc(payment_transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The `limit` most recent transactions.
pub async fn list_recent<C>(db: &C, limit: u64) -> Result<Vec<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .order_by_desc(payment_transaction::Column::CreatedAt)
        .order_by_desc(payment_transaction::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}
