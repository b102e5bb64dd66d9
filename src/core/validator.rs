//! Account validator - Decides whether a gateway account may pay an amount.
//!
//! The gateway sends the account reference it received in the checkout link
//! (`user_id`, optionally `course_id`). Validation is read-only and checks, in
//! order: the reference is well formed, the user exists, the product exists,
//! the amount equals the product price, and the product is not already paid.

use crate::{
    config::ProductDefaults,
    core::{
        course::{self, Product},
        transaction, user,
    },
    errors::{Error, Result},
};
use sea_orm::ConnectionTrait;
use tracing::debug;

/// Raw account reference as sent by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountRef {
    /// Referenced user id, unparsed
    pub user_id: Option<String>,
    /// Referenced course id, unparsed
    pub course_id: Option<String>,
}

/// An account that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayableAccount {
    /// Paying user
    pub user_id: i64,
    /// What is being bought
    pub product: Product,
}

impl PayableAccount {
    /// Product slot used for locking and pending lookups
    #[must_use]
    pub const fn slot(&self) -> (i64, Option<i64>) {
        (self.user_id, self.product.course_id)
    }
}

fn parse_positive(field: &'static str, raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(Error::InvalidAccount {
            field,
            reason: format!("{field} must be a positive integer, got {raw:?}"),
        }),
    }
}

/// Parses the account reference into `(user_id, course_id)`.
pub fn parse_account(account: &AccountRef) -> Result<(i64, Option<i64>)> {
    let raw_user = account
        .user_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .ok_or_else(|| Error::InvalidAccount {
            field: "user_id",
            reason: "user_id is missing".to_string(),
        })?;
    let user_id = parse_positive("user_id", raw_user)?;

    let course_id = account
        .course_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_positive("course_id", raw))
        .transpose()?;

    Ok((user_id, course_id))
}

/// Runs every account check and returns the payable account.
///
/// # Errors
/// - [`Error::InvalidAccount`] for a missing or malformed reference
/// - [`Error::UserNotFound`] / [`Error::CourseNotFound`] for unknown entities
/// - [`Error::InvalidAmount`] when `amount` differs from the product price
/// - [`Error::AlreadyPaid`] when the product was already performed for the user
pub async fn validate_account<C>(
    db: &C,
    account: &AccountRef,
    amount: i64,
    defaults: &ProductDefaults,
) -> Result<PayableAccount>
where
    C: ConnectionTrait,
{
    let (user_id, course_id) = parse_account(account)?;

    if !user::user_exists(db, user_id).await? {
        return Err(Error::UserNotFound { user_id });
    }

    let product = course::resolve_product(db, course_id, defaults).await?;
    if amount != product.price {
        return Err(Error::InvalidAmount {
            expected: product.price,
            received: amount,
        });
    }

    if transaction::has_successful_payment(db, user_id, product.course_id).await? {
        return Err(Error::AlreadyPaid { user_id });
    }

    debug!(user_id, course_id = ?product.course_id, "Account is payable");
    Ok(PayableAccount { user_id, product })
}
