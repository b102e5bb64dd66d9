//! Shared test utilities for course-keeper.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    bot::notifier::{AccessGrant, FulfillmentNotifier},
    config::ProductDefaults,
    core::{
        course::{self, NewCourse},
        transaction,
        user::{self, TelegramProfile},
    },
    entities,
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// File-backed `SQLite` database in the temp directory, deleted on drop.
///
/// Unlike `sqlite::memory:`, the pool opens several connections, so
/// concurrent writers really interleave.
pub struct FileTestDb {
    /// Connection pool
    pub db: DatabaseConnection,
    path: PathBuf,
}

impl FileTestDb {
    /// Creates a fresh database file with all tables initialized.
    pub async fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("course-keeper-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = crate::config::database::create_connection(&url).await?;
        crate::config::database::create_tables(&db).await?;
        Ok(Self { db, path })
    }
}

impl Drop for FileTestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            // Missing files are fine
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Registers a test user.
///
/// # Defaults
/// * `first_name`: "Test"
/// * `username`: "user{chat_id}"
pub async fn create_test_user(db: &DatabaseConnection, chat_id: i64) -> Result<entities::user::Model> {
    user::register_user(
        db,
        chat_id,
        TelegramProfile {
            first_name: Some("Test".to_string()),
            last_name: None,
            username: Some(format!("user{chat_id}")),
        },
    )
    .await
}

/// Creates an inactive test course.
///
/// # Defaults
/// * `channel_id`: -100000 minus the name length
/// * `channel_url`: None
pub async fn create_test_course(
    db: &DatabaseConnection,
    name: &str,
    price: i64,
) -> Result<entities::course::Model> {
    course::create_course(
        db,
        NewCourse {
            name: name.to_string(),
            price,
            channel_id: -100_000 - i64::try_from(name.len()).unwrap_or_default(),
            channel_url: None,
            description: None,
        },
    )
    .await
}

/// Default product used when no course is active: 97 000.00 in minor units.
pub fn test_product_defaults() -> ProductDefaults {
    ProductDefaults {
        price: 9_700_000,
        channel_id: Some(-1_001),
        channel_url: Some("https://t.me/test_channel".to_string()),
    }
}

/// Inserts a transaction that went all the way to `Performed`.
pub async fn create_performed_transaction(
    db: &DatabaseConnection,
    user_id: i64,
    course_id: Option<i64>,
    amount: i64,
    gateway_id: &str,
) -> Result<entities::payment_transaction::Model> {
    let tx = transaction::insert_created(db, user_id, course_id, amount).await?;
    transaction::bind_gateway_id(db, tx.id, gateway_id).await?;
    transaction::mark_performed(db, tx.id, crate::core::now_millis()).await?;
    Ok(transaction::find_by_order_id(db, &tx.order_id)
        .await?
        .unwrap_or(tx))
}

/// Notifier that records every grant instead of calling Telegram.
#[derive(Clone)]
pub struct RecordingNotifier {
    sender: mpsc::UnboundedSender<AccessGrant>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<AccessGrant>>>,
    count: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    /// Creates a notifier with an empty record
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits up to one second for the next grant.
    pub async fn next_grant(&self) -> Option<AccessGrant> {
        let mut receiver = self.receiver.lock().await;
        tokio::time::timeout(Duration::from_secs(1), receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Number of grants delivered so far
    pub fn grants_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FulfillmentNotifier for RecordingNotifier {
    async fn grant_access(&self, grant: AccessGrant) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as the notifier, send cannot fail here
        let _ = self.sender.send(grant);
        Ok(())
    }
}
