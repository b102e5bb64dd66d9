//! Wire types of the gateway's JSON-RPC protocol.
//!
//! Requests are `{"method", "params", "id"?}`. Responses carry either
//! `result` or `error` and echo `id` when the request had one. Times on the
//! wire are Unix milliseconds; unset times are sent as `0`.

use crate::{
    core::{
        payment::{
            CancelledTransaction, CreatedTransaction, PerformedTransaction, StatementEntry,
            TransactionDetails,
        },
        validator::AccountRef,
    },
    payme::error::RpcError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Incoming call
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
    /// Request id, echoed back
    #[serde(default)]
    pub id: Option<Value>,
}

/// Outgoing response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echoed request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl RpcResponse {
    /// Successful response
    #[must_use]
    pub const fn success(result: Value, id: Option<Value>) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response
    #[must_use]
    pub const fn failure(error: RpcError, id: Option<Value>) -> Self {
        Self {
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// The six gateway methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Pre-authorization probe
    CheckPerformTransaction,
    /// Register a gateway transaction
    CreateTransaction,
    /// Complete a transaction
    PerformTransaction,
    /// Cancel or reverse a transaction
    CancelTransaction,
    /// Read one transaction
    CheckTransaction,
    /// Reconciliation report
    GetStatement,
}

impl FromStr for Method {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CheckPerformTransaction" => Ok(Self::CheckPerformTransaction),
            "CreateTransaction" => Ok(Self::CreateTransaction),
            "PerformTransaction" => Ok(Self::PerformTransaction),
            "CancelTransaction" => Ok(Self::CancelTransaction),
            "CheckTransaction" => Ok(Self::CheckTransaction),
            "GetStatement" => Ok(Self::GetStatement),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// `account` object. Ids may arrive as strings or numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    course_id: Option<Value>,
}

fn id_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

impl From<Account> for AccountRef {
    fn from(account: Account) -> Self {
        Self {
            user_id: id_text(account.user_id),
            course_id: id_text(account.course_id),
        }
    }
}

/// `CheckPerformTransaction` params
#[derive(Debug, Deserialize)]
pub struct CheckPerformParams {
    /// Amount in minor units
    pub amount: i64,
    /// Account reference
    #[serde(default)]
    pub account: Account,
}

/// `CreateTransaction` params
#[derive(Debug, Deserialize)]
pub struct CreateParams {
    /// Gateway transaction id
    pub id: String,
    /// Gateway-side creation time, informational
    #[serde(default)]
    pub time: Option<i64>,
    /// Amount in minor units
    pub amount: i64,
    /// Account reference
    #[serde(default)]
    pub account: Account,
}

/// Params of the calls that only carry a gateway id
#[derive(Debug, Deserialize)]
pub struct TransactionIdParams {
    /// Gateway transaction id
    pub id: String,
}

/// `CancelTransaction` params
#[derive(Debug, Deserialize)]
pub struct CancelParams {
    /// Gateway transaction id
    pub id: String,
    /// Cancellation reason code
    #[serde(default)]
    pub reason: Option<i32>,
}

/// `GetStatement` params, Unix milliseconds
#[derive(Debug, Deserialize)]
pub struct StatementParams {
    /// Range start, inclusive
    pub from: i64,
    /// Range end, inclusive
    pub to: i64,
}

/// Converts a time to wire milliseconds.
#[must_use]
pub fn to_millis(time: Option<DateTime<Utc>>) -> i64 {
    time.map_or(0, |time| time.timestamp_millis())
}

/// Converts wire milliseconds to a time.
pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, RpcError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RpcError::parse_error(format!("timestamp {ms} out of range")))
}

/// `CheckPerformTransaction` result
#[derive(Debug, Serialize)]
pub struct AllowResult {
    /// Always true; refusals are errors
    pub allow: bool,
}

/// `CreateTransaction` result
#[derive(Debug, Serialize)]
pub struct CreateResult {
    /// Creation time
    pub create_time: i64,
    /// Local order id
    pub transaction: String,
    /// State code
    pub state: i32,
}

impl From<CreatedTransaction> for CreateResult {
    fn from(tx: CreatedTransaction) -> Self {
        Self {
            create_time: to_millis(Some(tx.create_time)),
            transaction: tx.order_id,
            state: tx.state.code(),
        }
    }
}

/// `PerformTransaction` result
#[derive(Debug, Serialize)]
pub struct PerformResult {
    /// Local order id
    pub transaction: String,
    /// Perform time
    pub perform_time: i64,
    /// State code
    pub state: i32,
}

impl From<PerformedTransaction> for PerformResult {
    fn from(tx: PerformedTransaction) -> Self {
        Self {
            transaction: tx.order_id,
            perform_time: to_millis(Some(tx.perform_time)),
            state: tx.state.code(),
        }
    }
}

/// `CancelTransaction` result
#[derive(Debug, Serialize)]
pub struct CancelResult {
    /// Local order id
    pub transaction: String,
    /// Cancel time
    pub cancel_time: i64,
    /// State code
    pub state: i32,
}

impl From<CancelledTransaction> for CancelResult {
    fn from(tx: CancelledTransaction) -> Self {
        Self {
            transaction: tx.order_id,
            cancel_time: to_millis(Some(tx.cancel_time)),
            state: tx.state.code(),
        }
    }
}

/// `CheckTransaction` result
#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// Creation time
    pub create_time: i64,
    /// Perform time or 0
    pub perform_time: i64,
    /// Cancel time or 0
    pub cancel_time: i64,
    /// Local order id
    pub transaction: String,
    /// State code
    pub state: i32,
    /// Cancellation reason
    pub reason: Option<i32>,
}

impl From<TransactionDetails> for CheckResult {
    fn from(tx: TransactionDetails) -> Self {
        Self {
            create_time: to_millis(Some(tx.create_time)),
            perform_time: to_millis(tx.perform_time),
            cancel_time: to_millis(tx.cancel_time),
            transaction: tx.order_id,
            state: tx.state.code(),
            reason: tx.reason,
        }
    }
}

/// Account echoed in statement lines. Ids go out as strings, the same
/// form the gateway sends them in.
#[derive(Debug, Serialize)]
pub struct StatementAccount {
    /// Paying user
    pub user_id: String,
    /// Purchased course
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
}

/// One statement line
#[derive(Debug, Serialize)]
pub struct StatementLine {
    /// Gateway transaction id
    pub id: String,
    /// Creation time
    pub time: i64,
    /// Amount in minor units
    pub amount: i64,
    /// Account reference
    pub account: StatementAccount,
    /// Creation time
    pub create_time: i64,
    /// Perform time or 0
    pub perform_time: i64,
    /// Cancel time or 0
    pub cancel_time: i64,
    /// Local order id
    pub transaction: String,
    /// State code
    pub state: i32,
    /// Cancellation reason
    pub reason: Option<i32>,
}

impl From<StatementEntry> for StatementLine {
    fn from(entry: StatementEntry) -> Self {
        let created = to_millis(Some(entry.create_time));
        Self {
            id: entry.gateway_id,
            time: created,
            amount: entry.amount,
            account: StatementAccount {
                user_id: entry.user_id.to_string(),
                course_id: entry.course_id.map(|id| id.to_string()),
            },
            create_time: created,
            perform_time: to_millis(entry.perform_time),
            cancel_time: to_millis(entry.cancel_time),
            transaction: entry.order_id,
            state: entry.state.code(),
            reason: entry.reason,
        }
    }
}

/// `GetStatement` result
#[derive(Debug, Serialize)]
pub struct StatementResult {
    /// Matching lines, oldest perform time first
    pub transactions: Vec<StatementLine>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names() {
        assert_eq!(
            "GetStatement".parse::<Method>(),
            Ok(Method::GetStatement)
        );
        let err = "ChangePassword".parse::<Method>().unwrap_err();
        assert_eq!(err.code, crate::payme::error::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_account_ids_accept_strings_and_numbers() -> serde_json::Result<()> {
        let params: CheckPerformParams = serde_json::from_value(json!({
            "amount": 100,
            "account": {"user_id": 42, "course_id": "7"}
        }))?;
        let account = AccountRef::from(params.account);
        assert_eq!(account.user_id.as_deref(), Some("42"));
        assert_eq!(account.course_id.as_deref(), Some("7"));

        let params: CheckPerformParams = serde_json::from_value(json!({"amount": 100}))?;
        assert_eq!(AccountRef::from(params.account), AccountRef::default());
        Ok(())
    }

    #[test]
    fn test_response_envelope_skips_empty_members() -> serde_json::Result<()> {
        let ok = RpcResponse::success(json!({"allow": true}), None);
        assert_eq!(serde_json::to_value(ok)?, json!({"result": {"allow": true}}));

        let err = RpcResponse::failure(RpcError::invalid_authorization(), Some(json!(9)));
        let value = serde_json::to_value(err)?;
        assert_eq!(value["id"], json!(9));
        assert_eq!(value["error"]["code"], json!(-32504));
        assert!(value.get("result").is_none());
        Ok(())
    }

    #[test]
    fn test_statement_account_ids_are_strings() -> serde_json::Result<()> {
        let account = StatementAccount {
            user_id: 42.to_string(),
            course_id: None,
        };
        assert_eq!(serde_json::to_value(&account)?, json!({"user_id": "42"}));

        let account = StatementAccount {
            user_id: 42.to_string(),
            course_id: Some(7.to_string()),
        };
        assert_eq!(
            serde_json::to_value(&account)?,
            json!({"user_id": "42", "course_id": "7"})
        );
        Ok(())
    }

    #[test]
    fn test_times_are_milliseconds() {
        assert_eq!(to_millis(None), 0);
        let time = from_millis(1_700_000_000_123).unwrap_or_default();
        assert_eq!(to_millis(Some(time)), 1_700_000_000_123);
    }
}
