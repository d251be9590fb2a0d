//! Wire envelope for the native transport.
//!
//! Calls travel as newline-delimited JSON-RPC 2.0 frames. The envelope
//! carries an optional `trace_id` in both directions; the server echoes
//! the id it resolved for the call so callers can correlate logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PARSE_ERROR_CODE: i64 = -32700;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), RpcError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(RpcError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(RpcError::InvalidRequest("empty method".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
            trace_id: None,
        }
    }

    pub fn error(id: Option<u64>, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: err.code(),
                message: err.to_string(),
                data: None,
            }),
            trace_id: None,
        }
    }

    /// Response for a frame that never parsed into a request. Carries no
    /// id because none could be read.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            result: None,
            error: Some(RpcErrorBody {
                code: PARSE_ERROR_CODE,
                message: message.into(),
                data: None,
            }),
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// True when the frame is structurally complete: exactly one of
    /// result/error present under the expected version tag. The
    /// conformance concurrency checks lean on this.
    pub fn is_well_formed(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION && (self.result.is_some() ^ self.error.is_some())
    }

    pub fn outcome(&self) -> &'static str {
        match &self.error {
            None => "ok",
            Some(body) => RpcError::from_code(body.code, body.message.clone()).outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let req = RpcRequest::new(7, "GetCustomCosts", Some(json!({"resources": []})))
            .with_trace_id("abc-123");
        let line = serde_json::to_string(&req).unwrap();
        let back: RpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.method, "GetCustomCosts");
        assert_eq!(back.trace_id.as_deref(), Some("abc-123"));
        back.validate().unwrap();
    }

    #[test]
    fn rejects_wrong_version() {
        let mut req = RpcRequest::new(1, "Name", None);
        req.jsonrpc = "1.0".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let resp = RpcResponse::error(Some(3), &RpcError::Unimplemented("budgets".into()));
        assert!(!resp.is_ok());
        assert!(resp.is_well_formed());
        let body = resp.error.as_ref().unwrap();
        assert_eq!(body.code, -32001);
        assert!(body.message.contains("budgets"));
        assert_eq!(resp.outcome(), "unimplemented");
    }

    #[test]
    fn well_formedness_requires_exactly_one_of_result_or_error() {
        let mut resp = RpcResponse::ok(1, json!({}));
        assert!(resp.is_well_formed());
        resp.error = Some(RpcErrorBody {
            code: -32603,
            message: "both".into(),
            data: None,
        });
        assert!(!resp.is_well_formed());
    }
}
