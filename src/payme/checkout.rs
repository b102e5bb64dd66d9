//! Checkout links sent to users by the bot.

use crate::{config::PaymeSettings, core::course::Product};

/// Builds the gateway checkout URL for `user_id` buying `product`.
///
/// `{base}/{merchant_id}?amount={price}&account[user_id]={user_id}`, plus
/// `&account[course_id]={id}` when the product is a course.
#[must_use]
pub fn checkout_url(payme: &PaymeSettings, user_id: i64, product: &Product) -> String {
    let mut url = format!(
        "{}/{}?amount={}&account[user_id]={user_id}",
        payme.active_checkout_url().trim_end_matches('/'),
        payme.merchant_id,
        product.price,
    );
    if let Some(course_id) = product.course_id {
        url.push_str(&format!("&account[course_id]={course_id}"));
    }
    url
}
