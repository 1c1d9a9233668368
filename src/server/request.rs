use crate::ids::RequestId;
use crate::router::{Binding, ParamVec};
use crate::schema::{coerce_query_values, coerce_scalar};
use may_minihttp::Request;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::io::Read;

/// Request metadata extracted before any body byte is read.
///
/// Header names are lowercased; the query string is kept as ordered pairs
/// so repeated keys survive until input composition.
#[derive(Debug)]
pub struct ParsedRequest {
    pub request_id: RequestId,
    /// Uppercased HTTP method.
    pub method: String,
    /// Path component without the query string.
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Decoded query pairs in occurrence order.
    pub query: Vec<(String, String)>,
}

/// Extract everything but the body from a `may_minihttp::Request`.
pub fn parse_request_head(req: &Request) -> ParsedRequest {
    let method = req.method().to_ascii_uppercase();
    let raw_path = req.path().to_string();
    let path = raw_path
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let request_id = RequestId::from_header_or_new(headers.get("x-request-id").map(String::as_str));
    let query = parse_query_pairs(&raw_path);

    ParsedRequest {
        request_id,
        method,
        path,
        headers,
        query,
    }
}

/// Decode the query string into ordered `(key, value)` pairs.
pub fn parse_query_pairs(raw_path: &str) -> Vec<(String, String)> {
    match raw_path.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => Vec::new(),
    }
}

/// Media type of a `Content-Type` header: the value before the first `;`,
/// trimmed and lowercased. An absent header normalizes to `""`.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Why body ingestion stopped early.
#[derive(Debug)]
pub enum BodyError {
    /// The running byte count crossed the configured limit; the rest of
    /// the stream was not consumed.
    TooLarge,
    Io(io::Error),
}

/// Read the request body with a byte counter.
///
/// Consumes the request because the body reader takes over the underlying
/// stream; callers extract [`ParsedRequest`] first.
pub fn read_body(req: Request, limit: Option<usize>) -> Result<Vec<u8>, BodyError> {
    let mut reader = req.body();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(max) = limit {
                    if buf.len() > max {
                        return Err(BodyError::TooLarge);
                    }
                }
            }
            Err(err) => return Err(BodyError::Io(err)),
        }
    }
    Ok(buf)
}

/// Assemble the candidate input for a binding.
///
/// Merge priority, later over earlier: query pairs, then path parameters,
/// then the JSON body. Query and path values arrive as strings and are
/// coerced against the declared leaf types; body values are used as-is. A
/// non-object body replaces the candidate wholesale. Returns `None` for
/// void-input procedures no matter what the request carried.
pub fn compose_input<Ctx>(
    binding: &Binding<Ctx>,
    path_params: &ParamVec,
    query: &[(String, String)],
    body: Option<Value>,
) -> Option<Value> {
    let schema = binding.input.as_ref()?;

    let mut candidate = Map::new();

    // Group query occurrences per key, preserving first-seen order.
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in query {
        match grouped.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value.clone()),
            None => grouped.push((key.clone(), vec![value.clone()])),
        }
    }
    for (key, values) in grouped {
        let declared = schema.property(&key);
        let shaped = coerce_query_values(&values, declared);
        candidate.insert(key, shaped);
    }

    for (name, value) in path_params {
        let declared = schema.property(name);
        candidate.insert(name.clone(), coerce_scalar(value, declared));
    }

    match body {
        Some(Value::Object(fields)) => {
            for (key, value) in fields {
                candidate.insert(key, value);
            }
            Some(Value::Object(candidate))
        }
        Some(other) => Some(other),
        None => Some(Value::Object(candidate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{OpenApiMeta, Procedure, RpcRouter};
    use crate::router::Router;
    use http::Method;
    use serde_json::json;

    fn echo_binding(input_schema: Value) -> Router<()> {
        let procedure = Procedure::query(|input, _| Ok(input.unwrap_or(json!({}))))
            .openapi(OpenApiMeta::new(Method::GET, "/echo/{id}"))
            .input(input_schema)
            .output(json!({ "type": "object" }));
        Router::from_rpc(&RpcRouter::new().procedure("echo", procedure)).unwrap()
    }

    #[test]
    fn test_parse_query_pairs_preserves_occurrence_order() {
        let pairs = parse_query_pairs("/p?k=a&x=1&k=b");
        assert_eq!(
            pairs,
            vec![
                ("k".to_string(), "a".to_string()),
                ("x".to_string(), "1".to_string()),
                ("k".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_query_pairs_decodes_percent_escapes() {
        let pairs = parse_query_pairs("/p?name=Lily%20Rose");
        assert_eq!(pairs[0].1, "Lily Rose");
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(
            normalize_content_type("Application/JSON; charset=utf-8"),
            "application/json"
        );
        assert_eq!(normalize_content_type("  text/plain "), "text/plain");
        assert_eq!(normalize_content_type(""), "");
    }

    #[test]
    fn test_compose_merges_body_over_path_over_query() {
        let router = echo_binding(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string" }
            }
        }));
        let binding = &router.bindings()[0];
        let mut params = ParamVec::new();
        params.push(("id".to_string(), "from-path".to_string()));
        let query = vec![
            ("id".to_string(), "from-query".to_string()),
            ("name".to_string(), "from-query".to_string()),
        ];
        let body = json!({ "name": "from-body" });

        let input = compose_input(binding, &params, &query, Some(body)).unwrap();
        assert_eq!(input["id"], "from-path");
        assert_eq!(input["name"], "from-body");
    }

    #[test]
    fn test_compose_repeated_query_key_yields_array() {
        let router = echo_binding(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "n": { "type": "array", "items": { "type": "integer" } }
            }
        }));
        let binding = &router.bindings()[0];
        let params = ParamVec::new();
        let query = vec![
            ("n".to_string(), "1".to_string()),
            ("n".to_string(), "2".to_string()),
        ];

        let input = compose_input(binding, &params, &query, None).unwrap();
        assert_eq!(input["n"], json!([1, 2]));
    }

    #[test]
    fn test_compose_coerces_path_params() {
        let router = echo_binding(json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } }
        }));
        let binding = &router.bindings()[0];
        let mut params = ParamVec::new();
        params.push(("id".to_string(), "42".to_string()));

        let input = compose_input(binding, &params, &[], None).unwrap();
        assert_eq!(input["id"], json!(42));
    }

    #[test]
    fn test_compose_scalar_body_replaces_candidate() {
        let router = echo_binding(json!({
            "type": "object",
            "properties": { "id": { "type": "string" } }
        }));
        let binding = &router.bindings()[0];
        let params = ParamVec::new();
        let query = vec![("id".to_string(), "q".to_string())];

        let input = compose_input(binding, &params, &query, Some(json!(7))).unwrap();
        assert_eq!(input, json!(7));
    }

    #[test]
    fn test_compose_void_input_is_absent() {
        let procedure = Procedure::query(|_, _: Option<&()>| Ok(json!({})))
            .openapi(OpenApiMeta::new(Method::GET, "/ping"))
            .output(json!({ "type": "object" }));
        let router = Router::from_rpc(&RpcRouter::new().procedure("ping", procedure)).unwrap();
        let binding = &router.bindings()[0];

        let query = vec![("ignored".to_string(), "1".to_string())];
        assert!(compose_input(binding, &ParamVec::new(), &query, None).is_none());
    }
}
