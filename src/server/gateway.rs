//! HTTP/JSON gateway for environments that cannot speak the native
//! transport.
//!
//! Accepts `POST /costsource.v1.CostSourceService.<Method>` with a JSON
//! body shaped like the contract message and translates it into the
//! same internal call every other transport makes. Non-2xx responses
//! carry a JSON body with a `message` field. CORS preflight honors the
//! configured allow/expose header lists: an unset list selects the
//! documented defaults, an explicitly empty list sends no headers.

use serde_json::Value;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::config::GatewayConfig;
use crate::contract::SERVICE_NAME;
use crate::protocol::{RpcRequest, PARSE_ERROR_CODE};
use crate::service::PluginService;
use crate::transport::MAX_FRAME_BYTES;

pub const DEFAULT_ALLOW_HEADERS: &[&str] = &["content-type", "x-trace-id"];
pub const DEFAULT_EXPOSE_HEADERS: &[&str] = &["x-trace-id"];

static GATEWAY_CALL_ID: AtomicU64 = AtomicU64::new(1);

pub async fn serve(
    service: Arc<PluginService>,
    config: GatewayConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let port = config.port;
    let filter = routes(service, &config);
    let (addr, fut) = warp::serve(filter).bind_with_graceful_shutdown(
        ([0, 0, 0, 0], port),
        async move {
            let _ = shutdown.recv().await;
        },
    );
    info!(%addr, "gateway listening");
    fut.await;
}

pub fn routes(
    service: Arc<PluginService>,
    config: &GatewayConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let call = warp::path::param::<String>()
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("x-trace-id"))
        .and(warp::body::content_length_limit(MAX_FRAME_BYTES as u64))
        .and(warp::body::json())
        .and(with_service(service))
        .and_then(handle_call);

    call.recover(handle_rejection).with(cors(config))
}

/// `None` configuration selects the documented defaults; an explicit
/// empty list is honored verbatim.
pub fn effective_allow_headers(config: &GatewayConfig) -> Vec<String> {
    match &config.allow_headers {
        None => DEFAULT_ALLOW_HEADERS.iter().map(|h| h.to_string()).collect(),
        Some(list) => list.clone(),
    }
}

pub fn effective_expose_headers(config: &GatewayConfig) -> Vec<String> {
    match &config.expose_headers {
        None => DEFAULT_EXPOSE_HEADERS.iter().map(|h| h.to_string()).collect(),
        Some(list) => list.clone(),
    }
}

fn cors(config: &GatewayConfig) -> warp::filters::cors::Cors {
    let mut cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["POST", "OPTIONS"]);
    for header in effective_allow_headers(config) {
        cors = cors.allow_header(header.as_str());
    }
    for header in effective_expose_headers(config) {
        cors = cors.expose_header(header.as_str());
    }
    cors.build()
}

fn with_service(
    service: Arc<PluginService>,
) -> impl Filter<Extract = (Arc<PluginService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

async fn handle_call(
    segment: String,
    trace_id: Option<String>,
    body: Value,
    service: Arc<PluginService>,
) -> Result<impl Reply, Rejection> {
    let prefix = format!("{SERVICE_NAME}.");
    let Some(method) = segment.strip_prefix(prefix.as_str()) else {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            format!("unknown path '{segment}'"),
            None,
        ));
    };

    let id = GATEWAY_CALL_ID.fetch_add(1, Ordering::Relaxed);
    let mut request = RpcRequest::new(id, method, Some(body));
    if let Some(trace_id) = trace_id {
        request = request.with_trace_id(trace_id);
    }

    let response = service.handle(request).await;
    let trace = response.trace_id.clone();
    match response.error {
        None => {
            let result = response.result.unwrap_or(Value::Null);
            Ok(json_reply(StatusCode::OK, &result, trace))
        }
        Some(body) => Ok(error_reply(
            status_for_code(body.code),
            body.message,
            trace,
        )),
    }
}

fn status_for_code(code: i64) -> StatusCode {
    match code {
        PARSE_ERROR_CODE | -32600 | -32602 => StatusCode::BAD_REQUEST,
        -32601 => StatusCode::NOT_FOUND,
        -32001 => StatusCode::NOT_IMPLEMENTED,
        -32002 => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_reply(status: StatusCode, value: &Value, trace_id: Option<String>) -> warp::reply::Response {
    let reply = warp::reply::with_status(warp::reply::json(value), status);
    match trace_id {
        Some(trace_id) => {
            warp::reply::with_header(reply, "x-trace-id", trace_id).into_response()
        }
        None => reply.into_response(),
    }
}

fn error_reply(
    status: StatusCode,
    message: String,
    trace_id: Option<String>,
) -> warp::reply::Response {
    json_reply(status, &serde_json::json!({ "message": message }), trace_id)
}

/// A malformed inbound request is the client's problem, never a crash:
/// map body/route rejections onto JSON client errors.
async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Rejection> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found".into(), None));
    }
    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string(), None));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body too large".into(),
            None,
        ));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".into(),
            None,
        ));
    }
    Err(err)
}
