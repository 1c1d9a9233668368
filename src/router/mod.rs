//! # Route table
//!
//! Compiles the `openapi` annotations of a procedure router into a table
//! of matchers and resolves incoming `(method, path)` pairs to bindings.
//!
//! Two phases:
//!
//! 1. **Compilation**: each declared path template (e.g. `/pets/{id}`)
//!    becomes a regex with case-insensitive literal segments and one
//!    capture per placeholder. Mis-declared procedures fail construction
//!    with a diagnostic naming the procedure.
//! 2. **Matching**: each request is tested against the compiled patterns
//!    in declaration order until one accepts, yielding the binding and the
//!    percent-decoded path parameters.

mod core;

pub use core::{Binding, ParamVec, PathPattern, RouteMatch, Router, MAX_INLINE_PARAMS};
