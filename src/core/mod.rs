//! Core business logic - framework-agnostic account, course and payment
//! operations. Nothing in here knows about HTTP or Telegram message layout.

/// Course catalog and product resolution
pub mod course;
/// Per-account async locks
pub mod locks;
/// Payment transaction state machine
pub mod payment;
/// Payment statistics and history
pub mod report;
/// Transaction store queries and guarded writes
pub mod transaction;
/// Telegram user registry
pub mod user;
/// Account validation for gateway checks
pub mod validator;

/// Current time truncated to milliseconds, the precision the gateway uses.
#[must_use]
pub fn now_millis() -> chrono::DateTime<chrono::Utc> {
    use chrono::SubsecRound;
    chrono::Utc::now().trunc_subsecs(3)
}
