//! Fulfillment - granting access to a course once its payment is performed.
//!
//! The payment state machine only knows the [`FulfillmentNotifier`] trait.
//! Delivery is at most once per performed transaction: the processor calls
//! the notifier exactly once and never retries.

use crate::{bot::telegram::TelegramClient, errors::Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Everything needed to hand out access for one performed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Paying user (Telegram chat id)
    pub user_id: i64,
    /// Local order id of the performed transaction
    pub order_id: String,
    /// Purchased course name, `None` for the default product
    pub course_name: Option<String>,
    /// Private channel to invite the user to
    pub channel_id: Option<i64>,
    /// Public channel link
    pub channel_url: Option<String>,
}

/// Grants access after a successful payment
#[async_trait]
pub trait FulfillmentNotifier: Send + Sync {
    /// Delivers the grant. Errors are logged by the caller and never undo the
    /// payment.
    async fn grant_access(&self, grant: AccessGrant) -> Result<()>;
}

/// Success text sent to the user, with or without an invite link.
#[must_use]
pub fn success_message(course_name: Option<&str>, invite_link: Option<&str>) -> String {
    let mut text = String::from("🎉 <b>Congratulations!</b>\n\n");
    match course_name {
        Some(name) => text.push_str(&format!(
            "Your payment for <b>{}</b> was received successfully!\n\n",
            escape_html(name)
        )),
        None => text.push_str("Your payment was received successfully!\n\n"),
    }
    match invite_link {
        Some(link) => {
            text.push_str(&format!("🔗 Link to the private channel:\n{link}\n\n"));
            text.push_str("⚠️ The link works only once!");
        }
        None => text.push_str("⚠️ An admin will contact you shortly."),
    }
    text
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Notifier that invites the user to the course channel over Telegram
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    /// Wraps a Bot API client
    #[must_use]
    pub const fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FulfillmentNotifier for TelegramNotifier {
    async fn grant_access(&self, grant: AccessGrant) -> Result<()> {
        let invite_link = match grant.channel_id {
            Some(channel_id) => match self.client.create_chat_invite_link(channel_id).await {
                Ok(link) => {
                    info!(user_id = grant.user_id, "Invite link created");
                    Some(link.invite_link)
                }
                Err(e) => {
                    error!(user_id = grant.user_id, "Failed to create invite link: {}", e);
                    None
                }
            },
            None => {
                warn!(
                    user_id = grant.user_id,
                    order_id = %grant.order_id,
                    "No private channel configured, sending fallback message"
                );
                None
            }
        };

        let text = success_message(grant.course_name.as_deref(), invite_link.as_deref());
        self.client.send_message(grant.user_id, &text).await?;
        info!(user_id = grant.user_id, order_id = %grant.order_id, "Success message sent");
        Ok(())
    }
}
