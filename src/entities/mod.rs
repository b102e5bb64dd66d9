//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables used by the bot and the
//! payment webhook. Each entity has a Model struct for data and an Entity
//! struct for operations.

pub mod course;
pub mod payment_transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use course::{Column as CourseColumn, Entity as Course, Model as CourseModel};
pub use payment_transaction::{
    Column as PaymentTransactionColumn, Entity as PaymentTransaction,
    Model as PaymentTransactionModel, TransactionState,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
