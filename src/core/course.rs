//! Course business logic - Handles the catalog of paid courses.
//!
//! This module provides functions for creating, retrieving, activating and
//! removing courses, plus [`resolve_product`], the one place that decides
//! what a payment is buying. A gateway call may name a course explicitly;
//! otherwise the active course is sold, and without any course the
//! configured single-product defaults apply.

use crate::{
    config::ProductDefaults,
    config::courses::Config as CoursesConfig,
    entities::{Course, course},
    errors::{Error, Result},
};
use sea_orm::{
    ConnectionTrait, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use tracing::{info, instrument};

/// Input for [`create_course`]
#[derive(Debug, Clone)]
pub struct NewCourse {
    /// Display name
    pub name: String,
    /// Price in minor currency units
    pub price: i64,
    /// Private channel granted on payment
    pub channel_id: i64,
    /// Public channel link
    pub channel_url: Option<String>,
    /// Long description
    pub description: Option<String>,
}

/// What a payment buys: a course or the default product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Course id, `None` for the default product
    pub course_id: Option<i64>,
    /// Display name, if known
    pub name: Option<String>,
    /// Expected amount in minor currency units
    pub price: i64,
    /// Private channel granted on payment
    pub channel_id: Option<i64>,
    /// Public channel link
    pub channel_url: Option<String>,
}

impl Product {
    /// Product backed by a course row
    #[must_use]
    pub fn from_course(course: course::Model) -> Self {
        Self {
            course_id: Some(course.id),
            name: Some(course.name),
            price: course.price,
            channel_id: Some(course.channel_id),
            channel_url: course.channel_url,
        }
    }

    /// Product built from the configured defaults
    #[must_use]
    pub fn from_defaults(defaults: &ProductDefaults) -> Self {
        Self {
            course_id: None,
            name: None,
            price: defaults.price,
            channel_id: defaults.channel_id,
            channel_url: defaults.channel_url.clone(),
        }
    }
}

/// Resolves the product a payment refers to.
///
/// * `Some(id)` - that course, or [`Error::CourseNotFound`]
/// * `None` - the active course, falling back to `defaults`
pub async fn resolve_product<C>(
    db: &C,
    course_id: Option<i64>,
    defaults: &ProductDefaults,
) -> Result<Product>
where
    C: ConnectionTrait,
{
    match course_id {
        Some(course_id) => get_course(db, course_id)
            .await?
            .map(Product::from_course)
            .ok_or(Error::CourseNotFound { course_id }),
        None => Ok(get_active_course(db)
            .await?
            .map_or_else(|| Product::from_defaults(defaults), Product::from_course)),
    }
}

/// Creates a new, inactive course after validating its fields.
///
/// # Errors
/// Returns an error if:
/// - The course name is empty or whitespace-only
/// - The price is not positive
/// - The database insert operation fails
pub async fn create_course<C>(db: &C, new_course: NewCourse) -> Result<course::Model>
where
    C: ConnectionTrait,
{
    if new_course.name.trim().is_empty() {
        return Err(Error::Config {
            message: "Course name cannot be empty".to_string(),
        });
    }
    if new_course.price <= 0 {
        return Err(Error::Config {
            message: format!("Course price must be positive, got {}", new_course.price),
        });
    }

    let model = course::ActiveModel {
        name: Set(new_course.name.trim().to_string()),
        description: Set(new_course.description),
        price: Set(new_course.price),
        channel_id: Set(new_course.channel_id),
        channel_url: Set(new_course.channel_url),
        is_active: Set(false),
        created_at: Set(crate::core::now_millis()),
        ..Default::default()
    };
    let inserted = model.insert(db).await?;
    info!("Course created: {} ({})", inserted.name, inserted.id);
    Ok(inserted)
}

/// Retrieves a course by id.
pub async fn get_course<C>(db: &C, course_id: i64) -> Result<Option<course::Model>>
where
    C: ConnectionTrait,
{
    Course::find_by_id(course_id).one(db).await.map_err(Into::into)
}

/// Retrieves a course by exact name.
pub async fn get_course_by_name<C>(db: &C, name: &str) -> Result<Option<course::Model>>
where
    C: ConnectionTrait,
{
    Course::find()
        .filter(course::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves the active course, if any.
pub async fn get_active_course<C>(db: &C) -> Result<Option<course::Model>>
where
    C: ConnectionTrait,
{
    Course::find()
        .filter(course::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists all courses, newest first.
pub async fn list_courses<C>(db: &C) -> Result<Vec<course::Model>>
where
    C: ConnectionTrait,
{
    Course::find()
        .order_by_desc(course::Column::CreatedAt)
        .order_by_desc(course::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Makes `course_id` the only active course.
#[instrument(skip(db))]
pub async fn set_active_course(db: &DatabaseConnection, course_id: i64) -> Result<course::Model> {
    let txn = db.begin().await?;

    let course = Course::find_by_id(course_id)
        .one(&txn)
        .await?
        .ok_or(Error::CourseNotFound { course_id })?;

    Course::update_many()
        .col_expr(course::Column::IsActive, Expr::value(false))
        .exec(&txn)
        .await?;

    let mut active: course::ActiveModel = course.into();
    active.is_active = Set(true);
    let updated = active.update(&txn).await?;

    txn.commit().await?;
    info!("Active course set: {}", course_id);
    Ok(updated)
}

/// Changes a course price. Transactions already created keep their amount.
pub async fn update_course_price<C>(db: &C, course_id: i64, price: i64) -> Result<course::Model>
where
    C: ConnectionTrait,
{
    if price <= 0 {
        return Err(Error::Config {
            message: format!("Course price must be positive, got {price}"),
        });
    }

    let course = get_course(db, course_id)
        .await?
        .ok_or(Error::CourseNotFound { course_id })?;
    let mut active: course::ActiveModel = course.into();
    active.price = Set(price);
    active.update(db).await.map_err(Into::into)
}

/// Deletes a course. Returns false if it did not exist.
pub async fn delete_course<C>(db: &C, course_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Course::delete_by_id(course_id).exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Inserts seed courses that do not exist yet and applies the `active` flag.
///
/// Returns how many courses were inserted.
#[instrument(skip_all)]
pub async fn seed_courses(db: &DatabaseConnection, config: &CoursesConfig) -> Result<usize> {
    let mut inserted = 0;
    for seed in &config.courses {
        let course = match get_course_by_name(db, seed.name.trim()).await? {
            Some(existing) => existing,
            None => {
                inserted += 1;
                create_course(
                    db,
                    NewCourse {
                        name: seed.name.clone(),
                        price: seed.price,
                        channel_id: seed.channel_id,
                        channel_url: seed.channel_url.clone(),
                        description: seed.description.clone(),
                    },
                )
                .await?
            }
        };
        if seed.active && !course.is_active {
            set_active_course(db, course.id).await?;
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::courses::CourseConfig;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_course_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_course(
            &db,
            NewCourse {
                name: "   ".to_string(),
                price: 100,
                channel_id: -1,
                channel_url: None,
                description: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = create_course(
            &db,
            NewCourse {
                name: "Free".to_string(),
                price: 0,
                channel_id: -1,
                channel_url: None,
                description: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Config { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_active_course_is_exclusive() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_course(&db, "First", 100).await?;
        let second = create_test_course(&db, "Second", 200).await?;

        set_active_course(&db, first.id).await?;
        set_active_course(&db, second.id).await?;

        let active = get_active_course(&db).await?.unwrap();
        assert_eq!(active.id, second.id);
        assert!(!get_course(&db, first.id).await?.unwrap().is_active);

        let missing = set_active_course(&db, 999).await;
        assert!(matches!(missing, Err(Error::CourseNotFound { course_id: 999 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_product_indirection() -> Result<()> {
        let db = setup_test_db().await?;
        let defaults = test_product_defaults();

        // No courses at all: defaults
        let product = resolve_product(&db, None, &defaults).await?;
        assert_eq!(product.course_id, None);
        assert_eq!(product.price, defaults.price);

        // Active course replaces the defaults
        let course = create_test_course(&db, "Active", 5_000_000).await?;
        set_active_course(&db, course.id).await?;
        let product = resolve_product(&db, None, &defaults).await?;
        assert_eq!(product.course_id, Some(course.id));
        assert_eq!(product.price, 5_000_000);

        // Explicit course id wins, even when inactive
        let other = create_test_course(&db, "Other", 1_000).await?;
        let product = resolve_product(&db, Some(other.id), &defaults).await?;
        assert_eq!(product.price, 1_000);

        let missing = resolve_product(&db, Some(12345), &defaults).await;
        assert!(matches!(
            missing,
            Err(Error::CourseNotFound { course_id: 12345 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_course() -> Result<()> {
        let db = setup_test_db().await?;
        let course = create_test_course(&db, "Course", 100).await?;

        let updated = update_course_price(&db, course.id, 250).await?;
        assert_eq!(updated.price, 250);
        assert!(update_course_price(&db, course.id, -1).await.is_err());

        assert!(delete_course(&db, course.id).await?);
        assert!(!delete_course(&db, course.id).await?);
        assert!(list_courses(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_courses_skips_existing() -> Result<()> {
        let db = setup_test_db().await?;
        let config = CoursesConfig {
            courses: vec![
                CourseConfig {
                    name: "Seeded".to_string(),
                    price: 9_700_000,
                    channel_id: -100,
                    channel_url: None,
                    description: None,
                    active: true,
                },
                CourseConfig {
                    name: "Extra".to_string(),
                    price: 100,
                    channel_id: -200,
                    channel_url: None,
                    description: None,
                    active: false,
                },
            ],
        };

        assert_eq!(seed_courses(&db, &config).await?, 2);
        assert_eq!(seed_courses(&db, &config).await?, 0);
        assert_eq!(list_courses(&db).await?.len(), 2);
        assert_eq!(get_active_course(&db).await?.unwrap().name, "Seeded");
        Ok(())
    }
}
