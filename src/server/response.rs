use crate::error::RpcError;
use crate::rpc::ErrorFormatter;
use may_minihttp::Response;
use serde_json::{Map, Value};

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        499 => "Client Closed Request",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "OK",
    }
}

fn apply_headers(res: &mut Response, headers: &[(String, String)]) {
    for (name, value) in headers {
        // may_minihttp stores header lines as borrowed 'static slices.
        let line: &'static str = Box::leak(format!("{name}: {value}").into_boxed_str());
        res.header(line);
    }
}

/// Write a JSON body with the given status and extra headers.
pub fn write_json(res: &mut Response, status: u16, body: &Value, headers: &[(String, String)]) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    apply_headers(res, headers);
    res.body_vec(serde_json::to_vec(body).unwrap_or_default());
}

/// Write an empty body; no `Content-Type` is set.
pub fn write_empty(res: &mut Response, status: u16, headers: &[(String, String)]) {
    res.status_code(status as usize, status_reason(status));
    apply_headers(res, headers);
}

/// Build the error body `{ message, code, issues? }`.
///
/// When a formatter is present its object shape is merged over the
/// defaults, after which `code` is re-asserted: the formatter may reword
/// the message or add fields, never change the code.
pub fn error_body(err: &RpcError, formatter: Option<&ErrorFormatter>) -> Value {
    let mut body = Map::new();
    body.insert("message".to_string(), Value::String(err.message.clone()));
    body.insert("code".to_string(), Value::String(err.code.as_str().to_string()));
    if !err.issues.is_empty() {
        if let Ok(issues) = serde_json::to_value(&err.issues) {
            body.insert("issues".to_string(), issues);
        }
    }

    if let Some(format) = formatter {
        if let Value::Object(formatted) = format(err) {
            for (key, value) in formatted {
                body.insert(key, value);
            }
        }
        body.insert("code".to_string(), Value::String(err.code.as_str().to_string()));
    }

    Value::Object(body)
}
