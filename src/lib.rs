//! restrpc exposes a procedure-based RPC router as a REST-style HTTP API.
//!
//! Procedures annotated with [`OpenApiMeta`] become HTTP routes; the
//! adapter decodes each request's path, query and body into the
//! procedure's declared input, validates it, invokes the procedure with a
//! caller-supplied context and serializes the validated output - or a
//! canonical error body - back to the client.
//!
//! ```rust,no_run
//! use http::Method;
//! use restrpc::{HttpServer, OpenApiMeta, OpenApiService, Procedure, RpcRouter};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let router: RpcRouter<()> = RpcRouter::new().procedure(
//!     "sayHello",
//!     Procedure::query(|input, _ctx| {
//!         let name = input
//!             .as_ref()
//!             .and_then(|v| v.get("name"))
//!             .and_then(|v| v.as_str())
//!             .unwrap_or("world");
//!         Ok(json!({ "greeting": format!("Hello {name}!") }))
//!     })
//!     .openapi(OpenApiMeta::new(Method::GET, "/say-hello"))
//!     .input(json!({
//!         "type": "object",
//!         "properties": { "name": { "type": "string" } },
//!         "required": ["name"]
//!     }))
//!     .output(json!({
//!         "type": "object",
//!         "properties": { "greeting": { "type": "string" } }
//!     })),
//! );
//!
//! let service = OpenApiService::builder(router).build()?;
//! HttpServer(service).start("127.0.0.1:8080")?.join().ok();
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod router;
pub mod rpc;
pub mod runtime_config;
pub mod schema;
pub mod server;

pub use error::{ErrorCode, RpcError, ValidationIssue};
pub use rpc::{
    DataTransformer, InputSchema, OpenApiMeta, OutputSchema, Procedure, ProcedureKind, RpcRouter,
};
pub use router::{Binding, RouteMatch, Router};
pub use server::{
    ErrorEvent, HttpServer, OpenApiService, OpenApiServiceBuilder, ParsedRequest, ResponseMeta,
    ResponseMetaArgs, ServerHandle,
};
