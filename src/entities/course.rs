//! Course entity - Paid products sold by the bot.
//!
//! Each course has a price in minor currency units and the private channel
//! buyers are invited to. At most one course is active; it is the product
//! offered when the gateway does not name a course.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Course database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    /// Unique identifier for the course
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Optional longer description shown in the welcome message
    pub description: Option<String>,
    /// Price in minor currency units (tiyin)
    pub price: i64,
    /// Telegram id of the private channel granted on payment
    pub channel_id: i64,
    /// Public link to the private channel, if any
    pub channel_url: Option<String>,
    /// Whether this is the course offered by default
    pub is_active: bool,
    /// When the course was created
    pub created_at: DateTimeUtc,
}

/// Courses are referenced by transactions through `course_id`
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
