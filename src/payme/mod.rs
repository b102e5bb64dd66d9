//! Payme webhook - JSON-RPC endpoint the payment gateway calls.
//!
//! `POST /payme` authenticates the call, decodes it into one of the six
//! protocol methods and runs it against the [`PaymentProcessor`].
//! `GET /health` reports whether the database answers.

/// Basic-auth check
pub mod auth;
/// Checkout link builder
pub mod checkout;
/// Error codes and envelope
pub mod error;
/// HTTP handlers and dispatcher
pub mod handlers;
/// Request, params and result wire types
pub mod protocol;

use crate::{config::Settings, core::payment::PaymentProcessor};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use checkout::checkout_url;

/// State shared by the webhook handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Payment state machine
    pub processor: Arc<PaymentProcessor>,
    /// Runtime settings, for the gateway key
    pub settings: Arc<Settings>,
}

/// Builds the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payme", post(handlers::payme_webhook))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
