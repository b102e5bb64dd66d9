//! User business logic - Telegram accounts that may pay for courses.
//!
//! Users are registered when they press /start. The payment webhook only
//! needs to know whether an account exists; everything else here serves the
//! bot and admin screens.

use crate::{
    entities::{User, user},
    errors::Result,
};
use sea_orm::{ConnectionTrait, PaginatorTrait, Set, prelude::*, sea_query::Expr};
use tracing::{debug, instrument};

/// Profile fields reported by Telegram for a chat
#[derive(Debug, Clone, Default)]
pub struct TelegramProfile {
    /// First name
    pub first_name: Option<String>,
    /// Last name
    pub last_name: Option<String>,
    /// Username without `@`
    pub username: Option<String>,
}

/// Registers a user, keeping the existing record on replays.
///
/// Returns the stored model, which is the original one when the user was
/// already known.
#[instrument(skip(db, profile))]
pub async fn register_user<C>(db: &C, chat_id: i64, profile: TelegramProfile) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_user(db, chat_id).await? {
        return Ok(existing);
    }

    let model = user::ActiveModel {
        chat_id: Set(chat_id),
        first_name: Set(profile.first_name),
        last_name: Set(profile.last_name),
        username: Set(profile.username.map(|name| name.trim_start_matches('@').to_string())),
        joined_at: Set(crate::core::now_millis()),
        is_active: Set(true),
    };
    let inserted = model.insert(db).await?;
    debug!("Registered user {}", chat_id);
    Ok(inserted)
}

/// Finds a user by Telegram chat id.
pub async fn get_user<C>(db: &C, chat_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(chat_id).one(db).await.map_err(Into::into)
}

/// Returns true if a user record exists for `chat_id`.
pub async fn user_exists<C>(db: &C, chat_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(User::find_by_id(chat_id).count(db).await? > 0)
}

/// Marks a user active or inactive (e.g. after they blocked the bot).
///
/// Returns false if the user does not exist.
pub async fn set_user_active<C>(db: &C, chat_id: i64, is_active: bool) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = User::update_many()
        .col_expr(user::Column::IsActive, Expr::value(is_active))
        .filter(user::Column::ChatId.eq(chat_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Counts all registered users.
pub async fn count_users<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    User::find().count(db).await.map_err(Into::into)
}
