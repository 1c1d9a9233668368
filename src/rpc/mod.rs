//! The procedure registry surface consumed by the HTTP adapter.
//!
//! A [`RpcRouter`] is an ordered namespace of named procedures, optionally
//! nested. Procedures that carry an [`OpenApiMeta`] annotation are exposed
//! over HTTP; the rest stay reachable only through the router's native
//! transport. The router also owns the cross-cutting hooks that belong to
//! the procedure layer rather than the HTTP layer: the error formatter and
//! the data transformer.

mod procedure;
mod router;

pub use procedure::{
    InputSchema, OpenApiMeta, OutputSchema, Procedure, ProcedureFn, ProcedureKind,
};
pub use router::{DataTransformer, ErrorFormatter, RpcRouter};
