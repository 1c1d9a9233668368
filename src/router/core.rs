//! Route table core - the hot path for request routing.

use crate::rpc::{InputSchema, OpenApiMeta, OutputSchema, ProcedureFn, ProcedureKind, RpcRouter};
use crate::schema::Schema;
use anyhow::{bail, Context};
use http::Method;
use percent_encoding::percent_decode_str;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of path parameters before parameter storage spills to the
/// heap. REST templates rarely carry more than a handful of placeholders.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated `(name, decoded value)` pairs extracted from a matched path.
pub type ParamVec = SmallVec<[(String, String); MAX_INLINE_PARAMS]>;

/// A compiled path template.
///
/// Literal segments match case-insensitively; `{name}` placeholders capture
/// any non-empty segment and are percent-decoded on match. Placeholder
/// values keep their original case.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
    normalized: String,
}

impl PathPattern {
    /// Compile a template like `/say-hello/{first}/{last}`.
    ///
    /// Fails when the template does not start with `/`, a placeholder name
    /// is empty, or the same placeholder appears twice.
    pub fn compile(template: &str) -> anyhow::Result<Self> {
        if !template.starts_with('/') {
            bail!("path template `{template}` must start with `/`");
        }

        if template == "/" {
            return Ok(PathPattern {
                template: template.to_string(),
                regex: Regex::new("^/$").expect("root path regex"),
                param_names: Vec::new(),
                normalized: "/".to_string(),
            });
        }

        let mut pattern = String::with_capacity(template.len() + 8);
        pattern.push('^');
        let mut normalized = String::with_capacity(template.len());
        let mut param_names = Vec::new();

        for segment in template.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    bail!("path template `{template}` has an empty placeholder");
                }
                if param_names.iter().any(|n| n == name) {
                    bail!("path template `{template}` repeats placeholder `{name}`");
                }
                pattern.push_str("/([^/]+)");
                normalized.push_str("/{}");
                param_names.push(name.to_string());
            } else {
                pattern.push_str("/(?i:");
                pattern.push_str(&regex::escape(segment));
                pattern.push(')');
                normalized.push('/');
                normalized.push_str(&segment.to_ascii_lowercase());
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .with_context(|| format!("path template `{template}` failed to compile"))?;

        Ok(PathPattern {
            template: template.to_string(),
            regex,
            param_names,
            normalized,
        })
    }

    /// Match a request path, yielding decoded placeholder values.
    ///
    /// A segment whose percent-decoding fails (or decodes to nothing)
    /// yields no match, which callers surface as "not found".
    pub fn match_path(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (idx, name) in self.param_names.iter().enumerate() {
            let raw = caps.get(idx + 1)?.as_str();
            let decoded = percent_decode_str(raw).decode_utf8().ok()?;
            if decoded.is_empty() {
                return None;
            }
            params.push((name.clone(), decoded.into_owned()));
        }
        Some(params)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Lowercased-literal structure used to detect conflicting templates.
    pub fn normalized_key(&self) -> &str {
        &self.normalized
    }
}

/// One annotated procedure bound to its compiled route.
///
/// Built once when the handler is created, immutable afterwards.
pub struct Binding<Ctx> {
    /// Dotted procedure name, e.g. `greeting.sayHello`.
    pub name: String,
    pub kind: ProcedureKind,
    pub method: Method,
    pub pattern: PathPattern,
    /// Accepted request content types, lowercased.
    pub content_types: Vec<String>,
    /// Compiled input schema; `None` means the procedure takes no input.
    pub input: Option<Schema>,
    /// Compiled output schema; `None` means the response body is empty.
    pub output: Option<Schema>,
    pub(crate) handler: ProcedureFn<Ctx>,
}

impl<Ctx> std::fmt::Debug for Binding<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("template", &self.pattern.template())
            .finish()
    }
}

/// Result of matching a request against the route table.
pub struct RouteMatch<Ctx> {
    pub binding: Arc<Binding<Ctx>>,
    pub path_params: ParamVec,
}

const SUPPORTED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// The route table: a flat, declaration-ordered list of compiled bindings.
///
/// Templates are shallow and few, so first-match scanning is both simple
/// and deterministic; conflicting templates are rejected at construction
/// instead of being resolved by precedence rules.
pub struct Router<Ctx> {
    bindings: Vec<Arc<Binding<Ctx>>>,
}

impl<Ctx> std::fmt::Debug for Router<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl<Ctx> Router<Ctx> {
    /// Build the route table from every procedure in the router that
    /// carries an `openapi` annotation.
    ///
    /// Mis-declared procedures fail construction with a diagnostic naming
    /// the offender: undeclared or non-object output schemas, non-object
    /// input schemas, placeholders missing from the input properties,
    /// empty content-type sets, and templates that collide on method plus
    /// lowercased literal structure.
    pub fn from_rpc(rpc: &RpcRouter<Ctx>) -> anyhow::Result<Self> {
        let mut bindings: Vec<Arc<Binding<Ctx>>> = Vec::new();
        let mut claimed: HashMap<(Method, String), String> = HashMap::new();
        let mut names_seen: HashSet<String> = HashSet::new();

        for (name, procedure) in rpc.procedures()? {
            let Some(OpenApiMeta {
                method,
                path,
                content_types,
            }) = procedure.openapi.clone()
            else {
                continue;
            };

            if !names_seen.insert(name.clone()) {
                bail!("procedure `{name}` is registered twice");
            }
            if !SUPPORTED_METHODS.contains(&method) {
                bail!("procedure `{name}` uses unsupported HTTP method {method}");
            }
            if content_types.is_empty() {
                bail!("procedure `{name}` declares an empty content-type set");
            }

            let pattern = PathPattern::compile(&path)
                .with_context(|| format!("procedure `{name}` has an invalid path template"))?;

            let input = match &procedure.input {
                InputSchema::Void => {
                    if !pattern.param_names().is_empty() {
                        bail!(
                            "procedure `{name}` declares path parameters but takes no input"
                        );
                    }
                    None
                }
                InputSchema::Json(raw) => {
                    let schema = Schema::compile(raw.clone())
                        .with_context(|| format!("procedure `{name}` input schema"))?;
                    if !schema.is_object_schema() {
                        bail!("procedure `{name}` input schema must describe an object");
                    }
                    for param in pattern.param_names() {
                        if !schema.has_property(param) {
                            bail!(
                                "procedure `{name}` path parameter `{param}` is not a property of its input schema"
                            );
                        }
                    }
                    Some(schema)
                }
            };

            let output = match &procedure.output {
                None => bail!("procedure `{name}` does not declare an output schema"),
                Some(OutputSchema::Void) => None,
                Some(OutputSchema::Json(raw)) => {
                    let schema = Schema::compile(raw.clone())
                        .with_context(|| format!("procedure `{name}` output schema"))?;
                    if !schema.is_object_schema() {
                        bail!("procedure `{name}` output schema must describe an object");
                    }
                    Some(schema)
                }
            };

            let key = (method.clone(), pattern.normalized_key().to_string());
            if let Some(other) = claimed.insert(key, name.clone()) {
                bail!(
                    "procedures `{other}` and `{name}` both claim {method} {}",
                    pattern.template()
                );
            }

            bindings.push(Arc::new(Binding {
                name,
                kind: procedure.kind,
                method,
                pattern,
                content_types: content_types
                    .iter()
                    .map(|t| t.to_ascii_lowercase())
                    .collect(),
                input,
                output,
                handler: procedure.handler(),
            }));
        }

        let summary: Vec<String> = bindings
            .iter()
            .take(10)
            .map(|b| format!("{} {} -> {}", b.method, b.pattern.template(), b.name))
            .collect();
        info!(
            bindings = bindings.len(),
            routes = ?summary,
            "route table built"
        );

        Ok(Router { bindings })
    }

    /// Match a request to a binding.
    ///
    /// Scans in declaration order and returns the first binding whose
    /// method equals the request method and whose pattern accepts the
    /// path. `None` covers both unknown paths and known paths hit with a
    /// method no binding declares.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch<Ctx>> {
        debug!(method = %method, path = %path, "route match attempt");
        for binding in &self.bindings {
            if binding.method != *method {
                continue;
            }
            if let Some(path_params) = binding.pattern.match_path(path) {
                debug!(
                    method = %method,
                    path = %path,
                    procedure = %binding.name,
                    template = %binding.pattern.template(),
                    "route matched"
                );
                return Some(RouteMatch {
                    binding: Arc::clone(binding),
                    path_params,
                });
            }
        }
        warn!(method = %method, path = %path, "no route matched");
        None
    }

    pub fn bindings(&self) -> &[Arc<Binding<Ctx>>] {
        &self.bindings
    }
}
