//! Lambda entry point. One deployed function serves one [`FunctionKind`].

use std::sync::Arc;

use lambda_runtime::{service_fn, Error as LambdaError, LambdaEvent};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    config::FunctionKind,
    event::{parse_request, ProxyResponse},
    pipeline::Laas,
};

pub async fn run(laas: Arc<Laas>, kind: FunctionKind) -> Result<(), LambdaError> {
    info!(function = ?kind, "Lambda runtime starting");
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let laas = laas.clone();
        async move { Ok::<_, LambdaError>(handler(&laas, kind, event).await) }
    }))
    .await
}

async fn handler(laas: &Laas, kind: FunctionKind, event: LambdaEvent<Value>) -> ProxyResponse {
    let (payload, context) = event.into_parts();
    info!(request_id = %context.request_id, function = ?kind, "invocation received");
    handle(laas, kind, &payload).await
}

/// Errors never escape as Lambda failures; they become proxy responses.
pub async fn handle(laas: &Laas, kind: FunctionKind, payload: &Value) -> ProxyResponse {
    let result = match parse_request(payload) {
        Ok(req) => laas.dispatch(kind, &req).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(body) => ProxyResponse::ok(&body),
        Err(e) => {
            if e.is_client_error() {
                warn!(error = %e, "invocation rejected");
            } else {
                error!(error = ?e, "invocation failed");
            }
            ProxyResponse::from_error(&e)
        }
    }
}
