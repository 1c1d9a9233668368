use super::procedure::Procedure;
use crate::error::RpcError;
use anyhow::bail;
use serde_json::Value;
use std::sync::Arc;

/// Serialization hooks used by the router's native transport. The HTTP
/// adapter never applies a transformer: HTTP inputs and outputs stay plain
/// JSON regardless of what the router declares here.
pub trait DataTransformer: Send + Sync {
    fn serialize(&self, value: Value) -> Value;
    fn deserialize(&self, value: Value) -> Value;
}

/// Hook that reshapes error bodies. The returned object is merged into the
/// wire body, but the `code` field and the HTTP status stay owned by the
/// adapter.
pub type ErrorFormatter = dyn Fn(&RpcError) -> Value + Send + Sync;

/// An ordered namespace of procedures, optionally nested. Procedure
/// identity is the dot-joined path of namespace names, e.g.
/// `greeting.sayHello`. Declaration order is preserved all the way into
/// the route table, which keeps resolution deterministic.
pub struct RpcRouter<Ctx> {
    procedures: Vec<(String, Procedure<Ctx>)>,
    nested: Vec<(String, RpcRouter<Ctx>)>,
    error_formatter: Option<Arc<ErrorFormatter>>,
    transformer: Option<Arc<dyn DataTransformer>>,
}

impl<Ctx> Default for RpcRouter<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> RpcRouter<Ctx> {
    pub fn new() -> Self {
        RpcRouter {
            procedures: Vec::new(),
            nested: Vec::new(),
            error_formatter: None,
            transformer: None,
        }
    }

    /// Register a procedure under `name`. `.` is reserved as the
    /// namespace separator; a name containing it is rejected when the
    /// namespace is flattened by [`procedures`](RpcRouter::procedures).
    pub fn procedure(mut self, name: impl Into<String>, procedure: Procedure<Ctx>) -> Self {
        self.procedures.push((name.into(), procedure));
        self
    }

    /// Mount a child router under a namespace prefix. The same `.`
    /// reservation as for procedure names applies to the prefix.
    pub fn nest(mut self, prefix: impl Into<String>, router: RpcRouter<Ctx>) -> Self {
        self.nested.push((prefix.into(), router));
        self
    }

    pub fn error_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&RpcError) -> Value + Send + Sync + 'static,
    {
        self.error_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn DataTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn get_error_formatter(&self) -> Option<Arc<ErrorFormatter>> {
        self.error_formatter.clone()
    }

    pub fn get_transformer(&self) -> Option<Arc<dyn DataTransformer>> {
        self.transformer.clone()
    }

    /// Flatten the namespace into `(dotted name, procedure)` pairs in
    /// declaration order, own procedures before nested routers.
    ///
    /// Fails when a procedure name or namespace prefix contains the
    /// reserved `.` separator, since that would forge a nested identity
    /// that was never declared.
    pub fn procedures(&self) -> anyhow::Result<Vec<(String, &Procedure<Ctx>)>> {
        let mut flat = Vec::new();
        self.collect_into("", &mut flat)?;
        Ok(flat)
    }

    fn collect_into<'a>(
        &'a self,
        prefix: &str,
        out: &mut Vec<(String, &'a Procedure<Ctx>)>,
    ) -> anyhow::Result<()> {
        for (name, procedure) in &self.procedures {
            if name.contains('.') {
                bail!("procedure name `{name}` contains the reserved namespace separator `.`");
            }
            let full = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            out.push((full, procedure));
        }
        for (ns, child) in &self.nested {
            if ns.contains('.') {
                bail!("namespace `{ns}` contains the reserved namespace separator `.`");
            }
            let child_prefix = if prefix.is_empty() {
                ns.clone()
            } else {
                format!("{prefix}.{ns}")
            };
            child.collect_into(&child_prefix, out)?;
        }
        Ok(())
    }
}
