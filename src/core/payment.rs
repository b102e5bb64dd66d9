//! Payment state machine - One operation per gateway callback.
//!
//! ```text
//!   0 Created --bind--> 1 Pending --perform--> 2 Performed
//!                           |                      |
//!                         cancel                 cancel
//!                           v                      v
//!                      -1 Cancelled           -2 Reversed
//! ```
//!
//! Every operation is idempotent under replay with identical parameters.
//! Creation is serialized per account slot with [`AccountLocks`] and runs in
//! a database transaction; the unique index on the gateway id is the last line
//! against duplicates. Later transitions are guarded updates, so only one
//! concurrent caller can win each of them.

use crate::{
    bot::notifier::{AccessGrant, FulfillmentNotifier},
    config::ProductDefaults,
    core::{
        course,
        locks::AccountLocks,
        now_millis, transaction,
        validator::{self, AccountRef},
    },
    entities::{TransactionState, payment_transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, SqlErr, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of `CreateTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTransaction {
    /// When the local row was created
    pub create_time: DateTime<Utc>,
    /// Local order id
    pub order_id: String,
    /// Current state
    pub state: TransactionState,
}

/// Result of `PerformTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformedTransaction {
    /// Local order id
    pub order_id: String,
    /// When the payment was performed
    pub perform_time: DateTime<Utc>,
    /// Always [`TransactionState::Performed`]
    pub state: TransactionState,
}

/// Result of `CancelTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledTransaction {
    /// Local order id
    pub order_id: String,
    /// When the transaction was cancelled
    pub cancel_time: DateTime<Utc>,
    /// [`TransactionState::Cancelled`] or [`TransactionState::Reversed`]
    pub state: TransactionState,
}

/// Full projection returned by `CheckTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetails {
    /// When the local row was created
    pub create_time: DateTime<Utc>,
    /// Set once performed
    pub perform_time: Option<DateTime<Utc>>,
    /// Set once cancelled
    pub cancel_time: Option<DateTime<Utc>>,
    /// Local order id
    pub order_id: String,
    /// Current state
    pub state: TransactionState,
    /// Gateway cancellation reason
    pub reason: Option<i32>,
}

/// One line of `GetStatement`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementEntry {
    /// Gateway transaction id
    pub gateway_id: String,
    /// Paid amount in minor units
    pub amount: i64,
    /// Paying user
    pub user_id: i64,
    /// Purchased course, `None` for the default product
    pub course_id: Option<i64>,
    /// When the local row was created
    pub create_time: DateTime<Utc>,
    /// When the payment was performed
    pub perform_time: Option<DateTime<Utc>>,
    /// When the payment was cancelled
    pub cancel_time: Option<DateTime<Utc>>,
    /// Local order id
    pub order_id: String,
    /// Current state
    pub state: TransactionState,
    /// Gateway cancellation reason
    pub reason: Option<i32>,
}

impl From<payment_transaction::Model> for TransactionDetails {
    fn from(tx: payment_transaction::Model) -> Self {
        Self {
            state: tx.current_state(),
            create_time: tx.created_at,
            perform_time: tx.perform_time,
            cancel_time: tx.cancel_time,
            order_id: tx.order_id,
            reason: tx.reason,
        }
    }
}

impl From<payment_transaction::Model> for StatementEntry {
    fn from(tx: payment_transaction::Model) -> Self {
        Self {
            state: tx.current_state(),
            gateway_id: tx.gateway_transaction_id.unwrap_or_default(),
            amount: tx.amount,
            user_id: tx.user_id,
            course_id: tx.course_id,
            create_time: tx.created_at,
            perform_time: tx.perform_time,
            cancel_time: tx.cancel_time,
            order_id: tx.order_id,
            reason: tx.reason,
        }
    }
}

fn is_unique_violation(err: &Error) -> bool {
    matches!(
        err,
        Error::Database(db_err)
            if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
}

/// Replay answer for a transaction already bound to the gateway id.
fn replay_created(tx: payment_transaction::Model, gateway_id: &str) -> Result<CreatedTransaction> {
    let state = tx.current_state();
    if state.is_cancelled() {
        return Err(Error::TransactionCancelled {
            gateway_id: gateway_id.to_string(),
        });
    }
    Ok(CreatedTransaction {
        create_time: tx.created_at,
        order_id: tx.order_id,
        state,
    })
}

/// Gateway transaction state machine
pub struct PaymentProcessor {
    db: DatabaseConnection,
    locks: AccountLocks,
    defaults: ProductDefaults,
    notifier: Arc<dyn FulfillmentNotifier>,
}

impl std::fmt::Debug for PaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProcessor")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl PaymentProcessor {
    /// Builds a processor over `db`, selling `defaults` when no course applies.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        defaults: ProductDefaults,
        notifier: Arc<dyn FulfillmentNotifier>,
    ) -> Self {
        Self {
            db,
            locks: AccountLocks::new(),
            defaults,
            notifier,
        }
    }

    /// Database handle used by the processor
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Pre-authorization probe. Never writes.
    ///
    /// # Errors
    /// Any validator rejection, or [`Error::TransactionInProgress`] when the
    /// account slot already holds a created or pending transaction.
    #[instrument(skip(self))]
    pub async fn check_perform_transaction(&self, account: &AccountRef, amount: i64) -> Result<()> {
        let payable = validator::validate_account(&self.db, account, amount, &self.defaults).await?;
        let (user_id, course_id) = payable.slot();

        if let Some(pending) = transaction::find_pending(&self.db, user_id, course_id).await? {
            debug!(order_id = %pending.order_id, "Account slot is busy");
            return Err(Error::TransactionInProgress { user_id });
        }
        Ok(())
    }

    /// Registers the gateway transaction `gateway_id` against a new order.
    ///
    /// Replays with a known `gateway_id` return the stored record without
    /// validating again.
    #[instrument(skip(self))]
    pub async fn create_transaction(
        &self,
        gateway_id: &str,
        account: &AccountRef,
        amount: i64,
    ) -> Result<CreatedTransaction> {
        if let Some(existing) = transaction::find_by_gateway_id(&self.db, gateway_id).await? {
            debug!(order_id = %existing.order_id, "CreateTransaction replay");
            return replay_created(existing, gateway_id);
        }

        let payable = validator::validate_account(&self.db, account, amount, &self.defaults).await?;
        let (user_id, course_id) = payable.slot();
        let _guard = self.locks.acquire(payable.slot()).await;

        match self
            .create_locked(gateway_id, user_id, course_id, amount)
            .await
        {
            Err(e) if is_unique_violation(&e) => {
                warn!("Concurrent create for {}, reading existing row", gateway_id);
                let existing = transaction::find_by_gateway_id(&self.db, gateway_id)
                    .await?
                    .ok_or(e)?;
                replay_created(existing, gateway_id)
            }
            other => other,
        }
    }

    /// Read-check-create under the account lock, in one database transaction.
    async fn create_locked(
        &self,
        gateway_id: &str,
        user_id: i64,
        course_id: Option<i64>,
        amount: i64,
    ) -> Result<CreatedTransaction> {
        let txn = self.db.begin().await?;

        // A concurrent call for the same gateway id may have won while we waited
        if let Some(existing) = transaction::find_by_gateway_id(&txn, gateway_id).await? {
            return replay_created(existing, gateway_id);
        }
        if transaction::has_successful_payment(&txn, user_id, course_id).await? {
            return Err(Error::AlreadyPaid { user_id });
        }
        if let Some(pending) = transaction::find_pending(&txn, user_id, course_id).await? {
            if pending.gateway_transaction_id.as_deref() != Some(gateway_id) {
                return Err(Error::TransactionInProgress { user_id });
            }
        }

        let created = transaction::insert_created(&txn, user_id, course_id, amount).await?;
        if !transaction::bind_gateway_id(&txn, created.id, gateway_id).await? {
            return Err(Error::TransactionCancelled {
                gateway_id: gateway_id.to_string(),
            });
        }
        txn.commit().await?;

        info!(
            user_id,
            order_id = %created.order_id,
            "Transaction {} created",
            gateway_id
        );
        Ok(CreatedTransaction {
            create_time: created.created_at,
            order_id: created.order_id,
            state: TransactionState::Pending,
        })
    }

    /// Completes a pending transaction and triggers fulfillment once.
    #[instrument(skip(self))]
    pub async fn perform_transaction(&self, gateway_id: &str) -> Result<PerformedTransaction> {
        let tx = self.require(gateway_id).await?;

        match tx.current_state() {
            TransactionState::Performed => return performed_result(tx, gateway_id),
            state if state.is_cancelled() => {
                return Err(Error::TransactionCancelled {
                    gateway_id: gateway_id.to_string(),
                });
            }
            _ => {}
        }

        let now = now_millis();
        if transaction::mark_performed(&self.db, tx.id, now).await? {
            info!(user_id = tx.user_id, order_id = %tx.order_id, "Transaction {} performed", gateway_id);
            self.dispatch_fulfillment(tx.user_id, tx.order_id.clone(), tx.course_id);
            return Ok(PerformedTransaction {
                order_id: tx.order_id,
                perform_time: now,
                state: TransactionState::Performed,
            });
        }

        // Lost the race; report whatever the winner left behind
        let current = self.require(gateway_id).await?;
        performed_result(current, gateway_id)
    }

    /// Fire-and-forget fulfillment for a freshly performed transaction.
    fn dispatch_fulfillment(&self, user_id: i64, order_id: String, course_id: Option<i64>) {
        let db = self.db.clone();
        let defaults = self.defaults.clone();
        let notifier = Arc::clone(&self.notifier);

        tokio::spawn(async move {
            let product = match course::resolve_product(&db, course_id, &defaults).await {
                Ok(product) => product,
                Err(e) => {
                    error!(user_id, %order_id, "Cannot resolve product for fulfillment: {}", e);
                    return;
                }
            };
            let grant = AccessGrant {
                user_id,
                order_id: order_id.clone(),
                course_name: product.name,
                channel_id: product.channel_id,
                channel_url: product.channel_url,
            };
            if let Err(e) = notifier.grant_access(grant).await {
                error!(user_id, %order_id, "Fulfillment failed: {}", e);
            }
        });
    }

    /// Cancels a transaction. Performed transactions become reversed (-2).
    #[instrument(skip(self))]
    pub async fn cancel_transaction(
        &self,
        gateway_id: &str,
        reason: Option<i32>,
    ) -> Result<CancelledTransaction> {
        let mut tx = self.require(gateway_id).await?;

        // States only move forward, so this settles after at most two rounds
        loop {
            let state = tx.current_state();
            if state.is_cancelled() {
                return Ok(CancelledTransaction {
                    cancel_time: tx.cancel_time.unwrap_or(tx.created_at),
                    order_id: tx.order_id,
                    state,
                });
            }

            let now = now_millis();
            if transaction::mark_cancelled(&self.db, tx.id, state, reason, now).await? {
                let new_state = state.cancelled_state();
                info!(
                    order_id = %tx.order_id,
                    reason = ?reason,
                    "Transaction {} cancelled with state {}",
                    gateway_id,
                    new_state.code()
                );
                return Ok(CancelledTransaction {
                    order_id: tx.order_id,
                    cancel_time: now,
                    state: new_state,
                });
            }
            tx = self.require(gateway_id).await?;
        }
    }

    /// Read-only projection of one transaction.
    pub async fn check_transaction(&self, gateway_id: &str) -> Result<TransactionDetails> {
        self.require(gateway_id).await.map(Into::into)
    }

    /// Performed transactions with `perform_time` in `[from, to]`.
    pub async fn get_statement(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StatementEntry>> {
        let rows = transaction::performed_between(&self.db, from, to).await?;
        debug!("Statement has {} entries", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn require(&self, gateway_id: &str) -> Result<payment_transaction::Model> {
        transaction::find_by_gateway_id(&self.db, gateway_id)
            .await?
            .ok_or_else(|| Error::TransactionNotFound {
                gateway_id: gateway_id.to_string(),
            })
    }
}

fn performed_result(tx: payment_transaction::Model, gateway_id: &str) -> Result<PerformedTransaction> {
    match (tx.current_state(), tx.perform_time) {
        (TransactionState::Performed, Some(perform_time)) => Ok(PerformedTransaction {
            order_id: tx.order_id,
            perform_time,
            state: TransactionState::Performed,
        }),
        _ => Err(Error::TransactionCancelled {
            gateway_id: gateway_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::Duration;

    fn account(user_id: i64) -> AccountRef {
        AccountRef {
            user_id: Some(user_id.to_string()),
            course_id: None,
        }
    }

    async fn setup() -> Result<(PaymentProcessor, RecordingNotifier)> {
        let db = setup_test_db().await?;
        create_test_user(&db, 42).await?;
        let notifier = RecordingNotifier::new();
        let processor =
            PaymentProcessor::new(db, test_product_defaults(), Arc::new(notifier.clone()));
        Ok((processor, notifier))
    }

    #[tokio::test]
    async fn test_full_payment_scenario() -> Result<()> {
        let (processor, notifier) = setup().await?;

        processor
            .check_perform_transaction(&account(42), 9_700_000)
            .await?;

        let created = processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await?;
        assert_eq!(created.state, TransactionState::Pending);

        let performed = processor.perform_transaction("g1").await?;
        assert_eq!(performed.state, TransactionState::Performed);
        assert_eq!(performed.order_id, created.order_id);

        let replay = processor.perform_transaction("g1").await?;
        assert_eq!(replay, performed);

        let grant = notifier.next_grant().await.unwrap();
        assert_eq!(grant.user_id, 42);
        assert_eq!(grant.order_id, created.order_id);
        assert_eq!(grant.channel_id, Some(-1_001));
        // Replay must not notify again
        assert_eq!(notifier.grants_count(), 1);

        // Performed transactions may be reversed
        let cancelled = processor.cancel_transaction("g1", Some(5)).await?;
        assert_eq!(cancelled.state, TransactionState::Reversed);

        let details = processor.check_transaction("g1").await?;
        assert_eq!(details.state, TransactionState::Reversed);
        assert_eq!(details.reason, Some(5));
        assert_eq!(details.perform_time, Some(performed.perform_time));
        assert_eq!(details.cancel_time, Some(cancelled.cancel_time));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_replay_returns_same_record() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        let first = processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await?;
        // Replays skip validation, even with a different amount
        let second = processor.create_transaction("g1", &account(42), 1).await?;
        assert_eq!(first, second);

        let rows = transaction::list_for_user(processor.db(), 42).await?;
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_creates_share_one_row() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        let acc = account(42);

        let (a, b) = tokio::join!(
            processor.create_transaction("g1", &acc, 9_700_000),
            processor.create_transaction("g1", &acc, 9_700_000),
        );
        let (a, b) = (a?, b?);
        assert_eq!(a.order_id, b.order_id);
        assert_eq!(a.create_time, b.create_time);

        let rows = transaction::list_for_user(processor.db(), 42).await?;
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_accounts_on_one_gateway_id() -> Result<()> {
        use sea_orm::{EntityTrait, PaginatorTrait};

        const ACCOUNTS: i64 = 40;
        let file_db = FileTestDb::new().await?;
        for user_id in 1..=ACCOUNTS {
            create_test_user(&file_db.db, user_id).await?;
        }
        let processor = Arc::new(PaymentProcessor::new(
            file_db.db.clone(),
            test_product_defaults(),
            Arc::new(RecordingNotifier::new()),
        ));

        // Different account slots take different locks, so only the
        // database can stop a second row for the same gateway id
        let handles: Vec<_> = (1..=ACCOUNTS)
            .map(|user_id| {
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    processor
                        .create_transaction("shared", &account(user_id), 9_700_000)
                        .await
                })
            })
            .collect();

        let mut order_ids = Vec::new();
        for handle in handles {
            order_ids.push(handle.await.unwrap()?.order_id);
        }
        order_ids.dedup();
        assert_eq!(order_ids.len(), 1);

        let rows = crate::entities::PaymentTransaction::find()
            .count(processor.db())
            .await?;
        assert_eq!(rows, 1);
        let stored = transaction::find_by_gateway_id(processor.db(), "shared")
            .await?
            .unwrap();
        assert_eq!(stored.order_id, order_ids[0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_gateway_id_is_rejected_while_pending() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await?;

        let result = processor
            .create_transaction("g2", &account(42), 9_700_000)
            .await;
        assert!(matches!(
            result,
            Err(Error::TransactionInProgress { user_id: 42 })
        ));

        let probe = processor
            .check_perform_transaction(&account(42), 9_700_000)
            .await;
        assert!(matches!(probe, Err(Error::TransactionInProgress { .. })));

        // Once the first one is cancelled the slot frees up
        processor.cancel_transaction("g1", Some(3)).await?;
        processor
            .create_transaction("g2", &account(42), 9_700_000)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_already_paid_blocks_new_payments() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await?;
        processor.perform_transaction("g1").await?;

        let probe = processor
            .check_perform_transaction(&account(42), 9_700_000)
            .await;
        assert!(matches!(probe, Err(Error::AlreadyPaid { user_id: 42 })));

        let create = processor
            .create_transaction("g2", &account(42), 9_700_000)
            .await;
        assert!(matches!(create, Err(Error::AlreadyPaid { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_errors_surface() -> Result<()> {
        let (processor, _notifier) = setup().await?;

        let wrong_amount = processor.check_perform_transaction(&account(42), 100).await;
        assert!(matches!(wrong_amount, Err(Error::InvalidAmount { .. })));

        let unknown = processor
            .create_transaction("g1", &account(99), 9_700_000)
            .await;
        assert!(matches!(unknown, Err(Error::UserNotFound { user_id: 99 })));
        assert!(processor.check_transaction("g1").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_pending_and_replay() -> Result<()> {
        let (processor, notifier) = setup().await?;
        processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await?;

        let first = processor.cancel_transaction("g1", Some(3)).await?;
        assert_eq!(first.state, TransactionState::Cancelled);

        let replay = processor.cancel_transaction("g1", Some(4)).await?;
        assert_eq!(replay, first);
        assert_eq!(processor.check_transaction("g1").await?.reason, Some(3));

        let perform = processor.perform_transaction("g1").await;
        assert!(matches!(perform, Err(Error::TransactionCancelled { .. })));

        let create = processor
            .create_transaction("g1", &account(42), 9_700_000)
            .await;
        assert!(matches!(create, Err(Error::TransactionCancelled { .. })));
        assert_eq!(notifier.grants_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_gateway_id() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        for result in [
            processor.perform_transaction("nope").await.map(|_| ()),
            processor.cancel_transaction("nope", None).await.map(|_| ()),
            processor.check_transaction("nope").await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(Error::TransactionNotFound { .. })));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_statement_only_lists_performed_in_range() -> Result<()> {
        let (processor, _notifier) = setup().await?;
        create_test_user(processor.db(), 7).await?;
        let start = now_millis();

        processor
            .create_transaction("paid", &account(42), 9_700_000)
            .await?;
        let performed = processor.perform_transaction("paid").await?;
        processor
            .create_transaction("pending", &account(7), 9_700_000)
            .await?;

        let end = now_millis() + Duration::seconds(1);
        let entries = processor.get_statement(start, end).await?;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.gateway_id, "paid");
        assert_eq!(entry.user_id, 42);
        assert_eq!(entry.amount, 9_700_000);
        assert_eq!(entry.perform_time, Some(performed.perform_time));
        assert_eq!(entry.state, TransactionState::Performed);

        let empty = processor
            .get_statement(end + Duration::hours(1), end + Duration::hours(2))
            .await?;
        assert!(empty.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_course_purchase_uses_course_channel() -> Result<()> {
        let (processor, notifier) = setup().await?;
        let course = create_test_course(processor.db(), "Rust", 5_000).await?;
        let acc = AccountRef {
            user_id: Some("42".to_string()),
            course_id: Some(course.id.to_string()),
        };

        processor.create_transaction("c1", &acc, 5_000).await?;
        processor.perform_transaction("c1").await?;

        let grant = notifier.next_grant().await.unwrap();
        assert_eq!(grant.course_name.as_deref(), Some("Rust"));
        assert_eq!(grant.channel_id, Some(course.channel_id));

        // The default product is a different slot and is still payable
        processor
            .check_perform_transaction(&account(42), 9_700_000)
            .await?;
        Ok(())
    }
}
