//! SDK for building and certifying cost-source plugins.
//!
//! A plugin implements the required [`capability::CostSource`] surface
//! plus any subset of the optional query capabilities, registers them on
//! a [`capability::PluginHandlers`] value, and hands that to
//! [`server::serve`]. The runtime wraps every call in the interceptor
//! chain (trace-id propagation, metrics, structured logging), serves the
//! native line-delimited JSON-RPC transport, and can optionally expose
//! an HTTP/JSON gateway for callers that cannot speak it.
//!
//! The [`conformance`] module certifies any implementation against the
//! Basic/Standard/Advanced levels through an in-process transport,
//! producing a machine-readable report.

pub mod capability;
pub mod client;
pub mod config;
pub mod conformance;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;

pub use capability::{CostSource, PluginHandlers, PluginIdentity};
pub use config::RuntimeConfig;
pub use conformance::{ConformanceLevel, ConformanceSuite};
pub use error::{PluginError, Result, RpcError};
pub use server::serve;
