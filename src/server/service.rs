use super::request::{
    compose_input, normalize_content_type, parse_request_head, read_body, BodyError, ParsedRequest,
};
use super::response::{error_body, write_empty, write_json};
use crate::dispatcher::Dispatcher;
use crate::error::{ErrorCode, RpcError};
use crate::router::{Binding, Router};
use crate::rpc::{ErrorFormatter, ProcedureKind, RpcRouter};
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

/// Status/header overrides returned by the response-meta hook; merged over
/// the adapter's defaults.
#[derive(Debug, Default, Clone)]
pub struct ResponseMeta {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

/// What the response-meta hook sees. `path` and `kind` are absent for
/// failures that never resolved a binding.
pub struct ResponseMetaArgs<'a, Ctx> {
    pub path: Option<&'a str>,
    pub kind: Option<ProcedureKind>,
    pub ctx: Option<&'a Ctx>,
    pub data: Option<&'a Value>,
    pub errors: &'a [RpcError],
}

/// What the error hook sees, once per failed request. `path`, `kind`,
/// `input` and `ctx` are filled in as far as the request got.
pub struct ErrorEvent<'a, Ctx> {
    pub error: &'a RpcError,
    pub kind: Option<ProcedureKind>,
    pub path: Option<&'a str>,
    pub input: Option<&'a Value>,
    pub ctx: Option<&'a Ctx>,
    pub req: &'a ParsedRequest,
}

pub type ContextFactory<Ctx> =
    Arc<dyn Fn(&ParsedRequest) -> Result<Ctx, RpcError> + Send + Sync>;
pub type ResponseMetaFn<Ctx> =
    Arc<dyn for<'a> Fn(ResponseMetaArgs<'a, Ctx>) -> ResponseMeta + Send + Sync>;
pub type OnErrorFn<Ctx> = Arc<dyn for<'a> Fn(ErrorEvent<'a, Ctx>) + Send + Sync>;

/// The HTTP adapter: routes a request to exactly one annotated procedure,
/// decodes and validates its input from path, query and body, invokes it
/// with the caller's context, validates the output and serializes the
/// response - including a well-formed error body for every failure class.
///
/// The route table and hooks are built once and immutable afterwards, so
/// clones of the service share them without synchronization.
pub struct OpenApiService<Ctx> {
    router: Arc<Router<Ctx>>,
    dispatcher: Arc<Dispatcher<Ctx>>,
    create_context: Option<ContextFactory<Ctx>>,
    response_meta: Option<ResponseMetaFn<Ctx>>,
    on_error: Option<OnErrorFn<Ctx>>,
    error_formatter: Option<Arc<ErrorFormatter>>,
    max_body_size: Option<usize>,
}

impl<Ctx> Clone for OpenApiService<Ctx> {
    fn clone(&self) -> Self {
        OpenApiService {
            router: Arc::clone(&self.router),
            dispatcher: Arc::clone(&self.dispatcher),
            create_context: self.create_context.clone(),
            response_meta: self.response_meta.clone(),
            on_error: self.on_error.clone(),
            error_formatter: self.error_formatter.clone(),
            max_body_size: self.max_body_size,
        }
    }
}

/// Builder for [`OpenApiService`]; collects the hooks, then compiles the
/// route table and spawns the procedure coroutines in [`build`].
///
/// [`build`]: OpenApiServiceBuilder::build
pub struct OpenApiServiceBuilder<Ctx> {
    rpc: RpcRouter<Ctx>,
    create_context: Option<ContextFactory<Ctx>>,
    response_meta: Option<ResponseMetaFn<Ctx>>,
    on_error: Option<OnErrorFn<Ctx>>,
    max_body_size: Option<usize>,
}

impl<Ctx> OpenApiServiceBuilder<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub fn new(rpc: RpcRouter<Ctx>) -> Self {
        OpenApiServiceBuilder {
            rpc,
            create_context: None,
            response_meta: None,
            on_error: None,
            max_body_size: None,
        }
    }

    /// Per-request context factory. When absent, procedures and hooks see
    /// no context.
    pub fn create_context<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ParsedRequest) -> Result<Ctx, RpcError> + Send + Sync + 'static,
    {
        self.create_context = Some(Arc::new(factory));
        self
    }

    pub fn response_meta<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(ResponseMetaArgs<'a, Ctx>) -> ResponseMeta + Send + Sync + 'static,
    {
        self.response_meta = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(ErrorEvent<'a, Ctx>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Reject request bodies larger than `bytes` with `PAYLOAD_TOO_LARGE`.
    /// Absent means unlimited.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = Some(bytes);
        self
    }

    /// Compile the route table and spawn one coroutine per bound procedure.
    ///
    /// Fails when any annotated procedure is mis-declared; the diagnostic
    /// names the procedure so it can be fixed before the service ships.
    pub fn build(self) -> anyhow::Result<OpenApiService<Ctx>> {
        let router = Arc::new(Router::from_rpc(&self.rpc)?);
        let mut dispatcher = Dispatcher::new();
        for binding in router.bindings() {
            unsafe {
                dispatcher.register(&binding.name, binding.handler.clone());
            }
        }
        Ok(OpenApiService {
            router,
            dispatcher: Arc::new(dispatcher),
            create_context: self.create_context,
            response_meta: self.response_meta,
            on_error: self.on_error,
            error_formatter: self.rpc.get_error_formatter(),
            max_body_size: self.max_body_size,
        })
    }
}

fn method_accepts_body(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "PATCH")
}

impl<Ctx> OpenApiService<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub fn builder(rpc: RpcRouter<Ctx>) -> OpenApiServiceBuilder<Ctx> {
        OpenApiServiceBuilder::new(rpc)
    }

    pub fn router(&self) -> &Router<Ctx> {
        &self.router
    }

    fn collect_meta(
        &self,
        binding: Option<&Binding<Ctx>>,
        ctx: Option<&Ctx>,
        data: Option<&Value>,
        errors: &[RpcError],
    ) -> ResponseMeta {
        match &self.response_meta {
            Some(hook) => hook(ResponseMetaArgs {
                path: binding.map(|b| b.name.as_str()),
                kind: binding.map(|b| b.kind),
                ctx,
                data,
                errors,
            }),
            None => ResponseMeta::default(),
        }
    }

    /// Complete a failed request: notify the error hook exactly once, let
    /// the response-meta hook adjust status/headers, serialize the error
    /// body.
    fn respond_error(
        &self,
        res: &mut Response,
        head: &ParsedRequest,
        err: RpcError,
        binding: Option<&Binding<Ctx>>,
        input: Option<&Value>,
        ctx: Option<&Ctx>,
    ) -> io::Result<()> {
        warn!(
            request_id = %head.request_id,
            method = %head.method,
            path = %head.path,
            code = %err.code,
            message = %err.message,
            cause = ?err.cause,
            "request failed"
        );

        if let Some(hook) = &self.on_error {
            hook(ErrorEvent {
                error: &err,
                kind: binding.map(|b| b.kind),
                path: binding.map(|b| b.name.as_str()),
                input,
                ctx,
                req: head,
            });
        }

        let errors = [err];
        let meta = self.collect_meta(binding, ctx, None, &errors);
        let status = meta.status.unwrap_or_else(|| errors[0].code.http_status());
        let body = error_body(&errors[0], self.error_formatter.as_deref());
        write_json(res, status, &body, &meta.headers);
        Ok(())
    }
}

impl<Ctx> HttpService for OpenApiService<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        // HEAD is the pre-warming contract: answer before any hook runs.
        if req.method().eq_ignore_ascii_case("HEAD") {
            write_empty(res, 204, &[]);
            return Ok(());
        }

        let head = parse_request_head(&req);

        let method = match head.method.parse::<Method>() {
            Ok(method) => method,
            Err(_) => {
                return self.respond_error(res, &head, RpcError::not_found(), None, None, None)
            }
        };

        let Some(route_match) = self.router.route(&method, &head.path) else {
            return self.respond_error(res, &head, RpcError::not_found(), None, None, None);
        };
        let binding = route_match.binding;
        let path_params = route_match.path_params;

        // Content-type gate and body ingestion; GET/DELETE bodies are
        // never read.
        let mut body_value: Option<Value> = None;
        if method_accepts_body(&method) {
            let raw_content_type = head
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_default();
            let media_type = normalize_content_type(&raw_content_type);
            let accepted = binding.content_types.iter().any(|t| t == &media_type);
            // application/json is the only media type the decoder itself
            // understands; anything else in the accepted set is inert.
            if !accepted || media_type != "application/json" {
                return self.respond_error(
                    res,
                    &head,
                    RpcError::unsupported_media_type(&raw_content_type),
                    Some(&binding),
                    None,
                    None,
                );
            }

            match read_body(req, self.max_body_size) {
                Ok(bytes) if bytes.is_empty() => {}
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => body_value = Some(value),
                    Err(err) => {
                        return self.respond_error(
                            res,
                            &head,
                            RpcError::internal("Failed to parse request body").with_cause(err),
                            Some(&binding),
                            None,
                            None,
                        )
                    }
                },
                Err(BodyError::TooLarge) => {
                    return self.respond_error(
                        res,
                        &head,
                        RpcError::payload_too_large(),
                        Some(&binding),
                        None,
                        None,
                    )
                }
                Err(BodyError::Io(err)) => {
                    return self.respond_error(
                        res,
                        &head,
                        RpcError::internal("Failed to read request body").with_cause(err),
                        Some(&binding),
                        None,
                        None,
                    )
                }
            }
        }

        let input = compose_input(&binding, &path_params, &head.query, body_value);

        // Everything that could fail without user code is behind us; only
        // now does the caller's context factory run.
        let ctx: Option<Arc<Ctx>> = match &self.create_context {
            Some(factory) => match factory(&head) {
                Ok(ctx) => Some(Arc::new(ctx)),
                Err(err) => {
                    let err = RpcError {
                        code: ErrorCode::InternalServerError,
                        ..err
                    };
                    return self.respond_error(
                        res,
                        &head,
                        err,
                        Some(&binding),
                        input.as_ref(),
                        None,
                    );
                }
            },
            None => None,
        };

        if let (Some(schema), Some(candidate)) = (&binding.input, &input) {
            if let Err(issues) = schema.validate(candidate) {
                let err = RpcError::bad_request("Input validation failed").with_issues(issues);
                return self.respond_error(
                    res,
                    &head,
                    err,
                    Some(&binding),
                    input.as_ref(),
                    ctx.as_deref(),
                );
            }
        }

        let output = match self.dispatcher.dispatch(
            &binding.name,
            head.request_id,
            input.clone(),
            ctx.clone(),
        ) {
            Ok(value) => value,
            Err(err) => {
                return self.respond_error(
                    res,
                    &head,
                    err,
                    Some(&binding),
                    input.as_ref(),
                    ctx.as_deref(),
                )
            }
        };

        if let Some(schema) = &binding.output {
            if let Err(issues) = schema.validate(&output) {
                warn!(
                    request_id = %head.request_id,
                    procedure = %binding.name,
                    issues = ?issues,
                    "output validation failed"
                );
                return self.respond_error(
                    res,
                    &head,
                    RpcError::internal("Output validation failed"),
                    Some(&binding),
                    input.as_ref(),
                    ctx.as_deref(),
                );
            }
        }

        let data = binding.output.as_ref().map(|_| &output);
        let meta = self.collect_meta(Some(&binding), ctx.as_deref(), data, &[]);
        let status = meta.status.unwrap_or(200);
        info!(
            request_id = %head.request_id,
            procedure = %binding.name,
            status,
            "request completed"
        );
        match &binding.output {
            Some(_) => write_json(res, status, &output, &meta.headers),
            None => write_empty(res, status, &meta.headers),
        }
        Ok(())
    }
}
