use crate::error::RpcError;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Whether a procedure reads or writes. Informational only: the HTTP
/// method comes from the [`OpenApiMeta`] annotation, not from the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureKind::Query => write!(f, "query"),
            ProcedureKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Routing annotation that exposes a procedure over HTTP.
#[derive(Debug, Clone)]
pub struct OpenApiMeta {
    /// HTTP method the procedure answers to.
    pub method: Method,
    /// Path template with `{name}` placeholders (e.g. `/say-hello/{first}`).
    pub path: String,
    /// Accepted request content types; defaults to `application/json`.
    pub content_types: Vec<String>,
}

impl OpenApiMeta {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        OpenApiMeta {
            method,
            path: path.into(),
            content_types: vec!["application/json".to_string()],
        }
    }

    pub fn content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Declared input shape. `Void` accepts only the absence of input.
#[derive(Debug, Clone)]
pub enum InputSchema {
    Void,
    Json(Value),
}

/// Declared output shape. `Void` serializes as an empty response body.
#[derive(Debug, Clone)]
pub enum OutputSchema {
    Void,
    Json(Value),
}

/// The opaque callable behind a procedure. Context is absent when no
/// context factory is configured on the HTTP handler.
pub type ProcedureFn<Ctx> =
    Arc<dyn Fn(Option<Value>, Option<&Ctx>) -> Result<Value, RpcError> + Send + Sync>;

/// One procedure: kind, optional HTTP annotation, schema declarations and
/// the handler itself.
pub struct Procedure<Ctx> {
    pub kind: ProcedureKind,
    pub openapi: Option<OpenApiMeta>,
    pub input: InputSchema,
    /// `None` means the procedure never declared an output, which the
    /// route table rejects at construction time.
    pub output: Option<OutputSchema>,
    pub(crate) handler: ProcedureFn<Ctx>,
}

impl<Ctx> Clone for Procedure<Ctx> {
    fn clone(&self) -> Self {
        Procedure {
            kind: self.kind,
            openapi: self.openapi.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<Ctx> fmt::Debug for Procedure<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.kind)
            .field("openapi", &self.openapi)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

impl<Ctx> Procedure<Ctx> {
    pub fn query<F>(handler: F) -> Self
    where
        F: Fn(Option<Value>, Option<&Ctx>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self::with_kind(ProcedureKind::Query, handler)
    }

    pub fn mutation<F>(handler: F) -> Self
    where
        F: Fn(Option<Value>, Option<&Ctx>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self::with_kind(ProcedureKind::Mutation, handler)
    }

    fn with_kind<F>(kind: ProcedureKind, handler: F) -> Self
    where
        F: Fn(Option<Value>, Option<&Ctx>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Procedure {
            kind,
            openapi: None,
            input: InputSchema::Void,
            output: None,
            handler: Arc::new(handler),
        }
    }

    /// Attach the HTTP routing annotation.
    pub fn openapi(mut self, meta: OpenApiMeta) -> Self {
        self.openapi = Some(meta);
        self
    }

    /// Declare the input as a JSON Schema object.
    pub fn input(mut self, schema: Value) -> Self {
        self.input = InputSchema::Json(schema);
        self
    }

    /// Declare the output as a JSON Schema object.
    pub fn output(mut self, schema: Value) -> Self {
        self.output = Some(OutputSchema::Json(schema));
        self
    }

    /// Declare that the procedure produces no output.
    pub fn output_void(mut self) -> Self {
        self.output = Some(OutputSchema::Void);
        self
    }

    pub fn handler(&self) -> ProcedureFn<Ctx> {
        Arc::clone(&self.handler)
    }
}
