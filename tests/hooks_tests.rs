//! Hook invariants: context factory, response-meta and error observer
//! firing rules across success and every failure class.

mod common;

use common::http::{json_body, send_request, status_of};
use http::Method;
use restrpc::server::OpenApiServiceBuilder;
use restrpc::{
    DataTransformer, ErrorCode, ErrorEvent, HttpServer, OpenApiMeta, OpenApiService, Procedure,
    ResponseMeta, ResponseMetaArgs, RpcError, RpcRouter, ServerHandle,
};
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct TestCtx {
    user: String,
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    errors: AtomicUsize,
    metas: AtomicUsize,
    error_paths: Mutex<Vec<Option<String>>>,
}

fn hook_router() -> RpcRouter<TestCtx> {
    RpcRouter::new()
        .procedure(
            "hello",
            Procedure::query(|_input, ctx: Option<&TestCtx>| {
                let user = ctx.map(|c| c.user.clone()).unwrap_or_default();
                Ok(json!({ "greeting": format!("Hello {user}!") }))
            })
            .openapi(OpenApiMeta::new(Method::GET, "/hello"))
            .output(json!({
                "type": "object",
                "properties": { "greeting": { "type": "string" } }
            })),
        )
        .procedure(
            "fail",
            Procedure::query(|_, _| {
                Err(RpcError::new(ErrorCode::Conflict, "already exists"))
            })
            .openapi(OpenApiMeta::new(Method::GET, "/fail"))
            .output(json!({ "type": "object" })),
        )
        .procedure(
            "echo",
            Procedure::mutation(|input, _| Ok(input.unwrap_or(json!({}))))
                .openapi(OpenApiMeta::new(Method::POST, "/echo"))
                .input(json!({
                    "type": "object",
                    "properties": { "payload": { "type": "string" } },
                    "required": ["payload"]
                }))
                .output(json!({ "type": "object" })),
        )
}

fn instrumented(
    router: RpcRouter<TestCtx>,
    counters: &Arc<Counters>,
) -> OpenApiServiceBuilder<TestCtx> {
    let on_create = Arc::clone(counters);
    let on_err = Arc::clone(counters);
    let on_meta = Arc::clone(counters);
    OpenApiService::builder(router)
        .create_context(move |_req| {
            on_create.created.fetch_add(1, Ordering::SeqCst);
            Ok(TestCtx {
                user: "lily".to_string(),
            })
        })
        .on_error(move |event: ErrorEvent<'_, TestCtx>| {
            on_err.errors.fetch_add(1, Ordering::SeqCst);
            on_err
                .error_paths
                .lock()
                .unwrap()
                .push(event.path.map(str::to_string));
        })
        .response_meta(move |_args: ResponseMetaArgs<'_, TestCtx>| {
            on_meta.metas.fetch_add(1, Ordering::SeqCst);
            ResponseMeta::default()
        })
}

fn start(builder: OpenApiServiceBuilder<TestCtx>) -> (ServerHandle, SocketAddr) {
    common::runtime::init();
    let service = builder.build().expect("service builds");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let handle = HttpServer(service).start(addr).unwrap();
    handle.wait_ready().unwrap();
    (handle, addr)
}

fn get(addr: &SocketAddr, path: &str) -> String {
    send_request(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
    )
}

fn post(addr: &SocketAddr, path: &str, content_type: &str, body: &str) -> String {
    send_request(
        addr,
        &format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ),
    )
}

#[test]
fn test_head_fires_no_hooks() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = send_request(&addr, "HEAD /hello HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status_of(&resp), 204);
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(counters.metas.load(Ordering::SeqCst), 0);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 0);
    handle.stop();
}

#[test]
fn test_success_fires_context_and_meta_once() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = get(&addr, "/hello");
    assert_eq!(status_of(&resp), 200);
    assert_eq!(json_body(&resp), json!({ "greeting": "Hello lily!" }));
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.metas.load(Ordering::SeqCst), 1);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 0);
    handle.stop();
}

#[test]
fn test_routing_miss_skips_context_and_reports_no_path() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = get(&addr, "/no-such");
    assert_eq!(status_of(&resp), 404);
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counters.metas.load(Ordering::SeqCst), 1);
    assert_eq!(counters.error_paths.lock().unwrap().as_slice(), &[None]);
    handle.stop();
}

#[test]
fn test_content_type_rejection_skips_context() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = post(&addr, "/echo", "text/plain", "hello");
    assert_eq!(status_of(&resp), 415);
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    handle.stop();
}

#[test]
fn test_payload_rejection_skips_context() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters).max_body_size(4));
    let resp = post(&addr, "/echo", "application/json", r#"{"payload":"hi"}"#);
    assert_eq!(status_of(&resp), 413);
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    handle.stop();
}

#[test]
fn test_malformed_json_skips_context() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = post(&addr, "/echo", "application/json", "{not json");
    assert_eq!(status_of(&resp), 500);
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    handle.stop();
}

#[test]
fn test_validation_failure_runs_after_context() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = post(&addr, "/echo", "application/json", r#"{"payload":1}"#);
    assert_eq!(status_of(&resp), 400);
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counters.metas.load(Ordering::SeqCst), 1);
    assert_eq!(
        counters.error_paths.lock().unwrap().as_slice(),
        &[Some("echo".to_string())]
    );
    handle.stop();
}

#[test]
fn test_procedure_failure_reports_path() {
    let counters = Arc::new(Counters::default());
    let (handle, addr) = start(instrumented(hook_router(), &counters));
    let resp = get(&addr, "/fail");
    assert_eq!(status_of(&resp), 409);
    assert_eq!(json_body(&resp)["code"], "CONFLICT");
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    assert_eq!(
        counters.error_paths.lock().unwrap().as_slice(),
        &[Some("fail".to_string())]
    );
    handle.stop();
}

#[test]
fn test_context_factory_failure_is_internal_error() {
    let counters = Arc::new(Counters::default());
    let on_err = Arc::clone(&counters);
    let builder = OpenApiService::builder(hook_router())
        .create_context(|_req| -> Result<TestCtx, RpcError> {
            Err(RpcError::new(ErrorCode::Unauthorized, "no session"))
        })
        .on_error(move |_event: ErrorEvent<'_, TestCtx>| {
            on_err.errors.fetch_add(1, Ordering::SeqCst);
        });
    let (handle, addr) = start(builder);
    let resp = get(&addr, "/hello");
    assert_eq!(status_of(&resp), 500);
    let body = json_body(&resp);
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["message"], "no session");
    assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    handle.stop();
}

#[test]
fn test_response_meta_overrides_status_and_headers() {
    let builder = OpenApiService::builder(hook_router())
        .create_context(|_req| {
            Ok(TestCtx {
                user: "lily".to_string(),
            })
        })
        .response_meta(|args: ResponseMetaArgs<'_, TestCtx>| {
            if args.errors.is_empty() {
                ResponseMeta {
                    status: Some(201),
                    headers: vec![("x-powered-by".to_string(), "restrpc".to_string())],
                }
            } else {
                ResponseMeta::default()
            }
        });
    let (handle, addr) = start(builder);
    let resp = get(&addr, "/hello");
    assert_eq!(status_of(&resp), 201);
    assert_eq!(
        common::http::header_of(&resp, "x-powered-by"),
        Some("restrpc")
    );
    handle.stop();
}

#[test]
fn test_error_formatter_reshapes_but_code_stays() {
    let router = hook_router().error_formatter(|err| {
        json!({
            "message": format!("formatted: {}", err.message),
            "code": "HIJACKED",
            "extra": true
        })
    });
    let (handle, addr) = start(OpenApiService::builder(router));
    let resp = get(&addr, "/no-such");
    assert_eq!(status_of(&resp), 404);
    let body = json_body(&resp);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "formatted: Not found");
    assert_eq!(body["extra"], true);
    handle.stop();
}

struct Wrapping;

impl DataTransformer for Wrapping {
    fn serialize(&self, value: Value) -> Value {
        json!({ "wrapped": value })
    }

    fn deserialize(&self, value: Value) -> Value {
        value.get("wrapped").cloned().unwrap_or(value)
    }
}

#[test]
fn test_transformer_is_not_applied_on_the_http_surface() {
    let router = hook_router().transformer(Arc::new(Wrapping));
    let builder = OpenApiService::builder(router).create_context(|_req| {
        Ok(TestCtx {
            user: "lily".to_string(),
        })
    });
    let (handle, addr) = start(builder);
    let resp = get(&addr, "/hello");
    assert_eq!(status_of(&resp), 200);
    // plain JSON output, no transformer envelope
    assert_eq!(json_body(&resp), json!({ "greeting": "Hello lily!" }));
    handle.stop();
}
