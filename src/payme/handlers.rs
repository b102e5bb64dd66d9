//! HTTP handlers and the method dispatcher.
//!
//! Every gateway call is answered with HTTP 200; success and failure are
//! told apart only by the `result`/`error` member of the body.

use crate::{
    core::payment::PaymentProcessor,
    payme::{
        AppState,
        auth::is_authorized,
        error::{CANT_PERFORM, RpcError},
        protocol::{
            AllowResult, CancelParams, CancelResult, CheckPerformParams, CheckResult,
            CreateParams, CreateResult, Method, PerformResult, RpcRequest, RpcResponse,
            StatementParams, StatementResult, TransactionIdParams, from_millis,
        },
    },
};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{error, info, warn};

/// `POST /payme`
pub async fn payme_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<RpcResponse> {
    if !is_authorized(&headers, state.settings.payme.active_key()) {
        return Json(RpcResponse::failure(RpcError::invalid_authorization(), None));
    }

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Unparseable gateway request: {}", e);
            return Json(RpcResponse::failure(RpcError::parse_error(e), None));
        }
    };

    Json(dispatch(&state.processor, request).await)
}

/// Runs one decoded request against the state machine.
pub async fn dispatch(processor: &PaymentProcessor, request: RpcRequest) -> RpcResponse {
    let RpcRequest { method, params, id } = request;
    info!(method = %method, "Gateway call");

    let outcome = match method.parse::<Method>() {
        Ok(method) => handle(processor, method, params).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => RpcResponse::success(result, id),
        Err(err) => {
            warn!(method = %method, code = err.code, "Gateway error: {}", err.message);
            RpcResponse::failure(err, id)
        }
    }
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(RpcError::parse_error)
}

fn encode<T: Serialize>(result: T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| {
        error!("Cannot encode gateway result: {}", e);
        RpcError::new(CANT_PERFORM, "Unable to perform operation")
    })
}

async fn handle(
    processor: &PaymentProcessor,
    method: Method,
    params: Value,
) -> Result<Value, RpcError> {
    match method {
        Method::CheckPerformTransaction => {
            let params: CheckPerformParams = decode(params)?;
            processor
                .check_perform_transaction(&params.account.into(), params.amount)
                .await?;
            encode(AllowResult { allow: true })
        }
        Method::CreateTransaction => {
            let params: CreateParams = decode(params)?;
            let created = processor
                .create_transaction(&params.id, &params.account.into(), params.amount)
                .await?;
            encode(CreateResult::from(created))
        }
        Method::PerformTransaction => {
            let params: TransactionIdParams = decode(params)?;
            let performed = processor.perform_transaction(&params.id).await?;
            encode(PerformResult::from(performed))
        }
        Method::CancelTransaction => {
            let params: CancelParams = decode(params)?;
            let cancelled = processor
                .cancel_transaction(&params.id, params.reason)
                .await?;
            encode(CancelResult::from(cancelled))
        }
        Method::CheckTransaction => {
            let params: TransactionIdParams = decode(params)?;
            let details = processor.check_transaction(&params.id).await?;
            encode(CheckResult::from(details))
        }
        Method::GetStatement => {
            let params: StatementParams = decode(params)?;
            let entries = processor
                .get_statement(from_millis(params.from)?, from_millis(params.to)?)
                .await?;
            encode(StatementResult {
                transactions: entries.into_iter().map(Into::into).collect(),
            })
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.processor.db().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
        }
    }
}
