//! # HTTP surface
//!
//! The adapter's HTTP side, built on `may_minihttp` and the `may`
//! coroutine runtime.
//!
//! Request flow:
//!
//! ```text
//! HTTP connection → OpenApiService → Router (route table) → Dispatcher → procedure
//! ```
//!
//! [`OpenApiService`] runs the stages in strict order for each request:
//! HEAD warmup, route resolution, content-type gate, bounded body
//! ingestion, input composition, context creation, input validation,
//! invocation, output validation, response-meta, serialization. Failures
//! at any stage complete the response with a canonical error body; no
//! failure aborts the process.

/// HTTP server wrapper using may_minihttp
pub mod http_server;
/// Request decoding: head extraction, query pairs, bounded body, input composition
pub mod request;
/// Response serialization and error bodies
pub mod response;
/// The adapter pipeline
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_query_pairs, ParsedRequest};
pub use service::{
    ErrorEvent, OpenApiService, OpenApiServiceBuilder, ResponseMeta, ResponseMetaArgs,
};
