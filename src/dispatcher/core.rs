use crate::error::RpcError;
use crate::ids::RequestId;
use crate::rpc::ProcedureFn;
use crate::runtime_config::RuntimeConfig;
use may::coroutine;
use may::sync::mpsc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// One invocation sent to a procedure coroutine.
///
/// The context travels as a shared handle because it outlives the call: the
/// response-meta hook still reads it after the procedure replied.
pub struct ProcedureCall<Ctx> {
    pub request_id: RequestId,
    pub input: Option<Value>,
    pub ctx: Option<Arc<Ctx>>,
    /// Channel for sending the outcome back to the dispatcher.
    pub reply_tx: mpsc::Sender<Result<Value, RpcError>>,
}

/// Type alias for a channel sender that feeds a procedure coroutine.
pub type CallSender<Ctx> = mpsc::Sender<ProcedureCall<Ctx>>;

/// Dispatcher that routes resolved calls to procedure coroutines.
///
/// Each registered procedure runs in its own long-lived coroutine and
/// receives calls over an mpsc channel; the reply comes back over a
/// per-call channel. Panics inside a procedure are caught and converted to
/// internal errors so one bad call cannot take the worker down.
pub struct Dispatcher<Ctx> {
    handlers: HashMap<String, CallSender<Ctx>>,
}

impl<Ctx> Default for Dispatcher<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> Dispatcher<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Dispatcher {
            handlers: HashMap::new(),
        }
    }

    /// Spawn a coroutine for the named procedure and register its sender.
    ///
    /// If a procedure with the same name already exists it is replaced; the
    /// old sender is dropped, which closes its channel and lets the old
    /// coroutine exit.
    ///
    /// # Safety
    ///
    /// Calls `may::coroutine::Builder::spawn()`, which is unsafe in the
    /// `may` runtime. The caller must ensure the runtime is initialized and
    /// that the configured stack size is large enough for the handler.
    pub unsafe fn register(&mut self, name: &str, handler: ProcedureFn<Ctx>) {
        let (tx, rx) = mpsc::channel::<ProcedureCall<Ctx>>();
        let stack_size = RuntimeConfig::from_env().stack_size;
        let procedure = name.to_string();

        let spawn_result = coroutine::Builder::new()
            .stack_size(stack_size)
            .spawn(move || {
                debug!(procedure = %procedure, stack_size, "procedure coroutine started");

                for call in rx.iter() {
                    let ProcedureCall {
                        request_id,
                        input,
                        ctx,
                        reply_tx,
                    } = call;

                    let started = Instant::now();
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        handler(input, ctx.as_deref())
                    }));

                    let reply = match outcome {
                        Ok(result) => result,
                        Err(panic) => {
                            error!(
                                request_id = %request_id,
                                procedure = %procedure,
                                panic = ?panic,
                                "procedure panicked"
                            );
                            Err(RpcError::internal("Internal server error")
                                .with_cause(format!("{panic:?}")))
                        }
                    };

                    debug!(
                        request_id = %request_id,
                        procedure = %procedure,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        ok = reply.is_ok(),
                        "procedure call finished"
                    );
                    let _ = reply_tx.send(reply);
                }

                debug!(procedure = %procedure, "procedure coroutine stopped");
            });

        match spawn_result {
            Ok(_) => {
                if self.handlers.insert(name.to_string(), tx).is_some() {
                    info!(procedure = %name, "replaced existing procedure worker");
                }
            }
            Err(err) => {
                error!(procedure = %name, error = %err, stack_size, "failed to spawn procedure coroutine");
            }
        }
    }

    /// Send a call to the named procedure and wait for its reply.
    ///
    /// A missing registration or a closed channel surfaces as an internal
    /// error rather than a panic; the caller turns it into a 500.
    pub fn dispatch(
        &self,
        name: &str,
        request_id: RequestId,
        input: Option<Value>,
        ctx: Option<Arc<Ctx>>,
    ) -> Result<Value, RpcError> {
        let tx = self.handlers.get(name).ok_or_else(|| {
            error!(procedure = %name, "procedure not registered");
            RpcError::internal("Internal server error").with_cause("procedure not registered")
        })?;

        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(ProcedureCall {
            request_id,
            input,
            ctx,
            reply_tx,
        })
        .map_err(|_| {
            error!(procedure = %name, "procedure channel closed");
            RpcError::internal("Internal server error").with_cause("procedure channel closed")
        })?;

        match reply_rx.recv() {
            Ok(reply) => reply,
            Err(_) => {
                error!(procedure = %name, "procedure worker dropped the reply channel");
                Err(RpcError::internal("Internal server error")
                    .with_cause("procedure reply channel closed"))
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
