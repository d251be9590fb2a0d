use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Call error: {0}")]
    Rpc(#[from] RpcError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid plugin identity: {0}")]
    InvalidIdentity(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bind failed on port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Transport closed")]
    Closed,

    #[error("Invalid frame format")]
    InvalidFrame,
}

/// Per-call error classes surfaced to the caller as structured error
/// responses. `Unimplemented` is deliberately distinct from the client
/// errors so a caller can tell "you asked wrong" from "this plugin does
/// not do that".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Capability not implemented: {0}")]
    Unimplemented(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidArgument(_) => -32602,
            RpcError::Internal(_) => -32603,
            RpcError::Unimplemented(_) => -32001,
            RpcError::DeadlineExceeded => -32002,
        }
    }

    pub fn from_code(code: i64, message: String) -> Self {
        match code {
            -32700 | -32600 => RpcError::InvalidRequest(message),
            -32601 => RpcError::MethodNotFound(message),
            -32602 => RpcError::InvalidArgument(message),
            -32001 => RpcError::Unimplemented(message),
            -32002 => RpcError::DeadlineExceeded,
            _ => RpcError::Internal(message),
        }
    }

    /// Low-cardinality outcome label used by the metrics interceptor.
    pub fn outcome(&self) -> &'static str {
        match self {
            RpcError::InvalidRequest(_) | RpcError::InvalidArgument(_) => "invalid",
            RpcError::MethodNotFound(_) => "not_found",
            RpcError::Unimplemented(_) => "unimplemented",
            RpcError::DeadlineExceeded => "timeout",
            RpcError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
