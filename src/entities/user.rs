//! User entity - Telegram users who started the bot.
//!
//! The Telegram chat id is the primary key and doubles as the payment
//! account reference (`account.user_id`) sent by the gateway.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Telegram chat id
    #[sea_orm(primary_key, auto_increment = false)]
    pub chat_id: i64,
    /// Telegram first name
    pub first_name: Option<String>,
    /// Telegram last name
    pub last_name: Option<String>,
    /// Telegram `@username` without the at sign
    pub username: Option<String>,
    /// When the user first pressed /start
    pub joined_at: DateTimeUtc,
    /// False once the user blocked the bot
    pub is_active: bool,
}

/// Users are referenced by transactions through `user_id`, no foreign key is declared
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
