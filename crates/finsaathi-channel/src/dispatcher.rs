// Method table and dispatcher: routes each call to its handler and turns
// whatever the handler does into exactly one Outcome.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::protocol::{INTERNAL_ERROR, INVALID_ARGUMENTS, MethodCall, MethodError, Outcome, TIMEOUT};

pub type HandlerResult = Result<Value, MethodError>;

/// Handler function type: takes the call arguments, returns a value or a method error.
pub type HandlerFn =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Returned when two handlers are registered under one name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("method already registered: {0}")]
pub struct DuplicateMethod(pub String);

/// Immutable mapping from method name to handler.
#[derive(Clone, Default)]
pub struct MethodTable {
    handlers: HashMap<String, HandlerFn>,
}

impl MethodTable {
    pub fn builder() -> MethodTableBuilder {
        MethodTableBuilder::default()
    }

    pub fn get(&self, method: &str) -> Option<&HandlerFn> {
        self.handlers.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.methods())
            .finish()
    }
}

#[derive(Default)]
pub struct MethodTableBuilder {
    handlers: HashMap<String, HandlerFn>,
}

impl MethodTableBuilder {
    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl Fn(Option<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    ) -> Result<(), DuplicateMethod> {
        let method = method.into();
        if self.handlers.contains_key(&method) {
            return Err(DuplicateMethod(method));
        }
        self.handlers.insert(method, Arc::new(handler));
        Ok(())
    }

    pub fn build(self) -> MethodTable {
        MethodTable {
            handlers: self.handlers,
        }
    }
}

/// Routes calls to the handlers of one channel.
///
/// Each handler runs on its own runtime task, so a slow or panicking handler
/// never blocks or takes down the caller. Must be used from within a tokio
/// runtime.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    channel: String,
    table: Arc<MethodTable>,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(channel: impl Into<String>, table: MethodTable) -> Self {
        Self {
            channel: channel.into(),
            table: Arc::new(table),
            call_timeout: None,
        }
    }

    pub fn from_config(config: &ChannelConfig, table: MethodTable) -> Self {
        Self::new(config.name.clone(), table).with_timeout(config.call_timeout())
    }

    pub fn with_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn table(&self) -> &MethodTable {
        &self.table
    }

    /// Execute a call and produce its single outcome.
    pub async fn dispatch(&self, call: MethodCall) -> Outcome {
        let Some(handler) = self.table.get(&call.method).cloned() else {
            tracing::debug!("{}: unsupported method {}", self.channel, call.method);
            return Outcome::Unsupported;
        };

        tracing::debug!("{}: dispatching {}", self.channel, call.method);
        // The handler is called inside the task so a panic while building its
        // future is caught there too.
        let args = call.args;
        let task = tokio::spawn(async move { handler(args).await });
        let abort = task.abort_handle();

        let joined = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    tracing::warn!(
                        "{}: {} timed out after {:?}",
                        self.channel,
                        call.method,
                        limit
                    );
                    return Outcome::failure(
                        TIMEOUT,
                        format!("{} did not complete within {:?}", call.method, limit),
                    );
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!("{}: {} failed: {}", self.channel, call.method, e);
                }
                result.into()
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!("{}: {} panicked: {}", self.channel, call.method, message);
                Outcome::failure(INTERNAL_ERROR, message)
            }
            Err(e) => {
                tracing::error!("{}: {} was cancelled: {}", self.channel, call.method, e);
                Outcome::failure(INTERNAL_ERROR, format!("{} was cancelled", call.method))
            }
        }
    }

    /// Execute a call whose arguments arrive as JSON text.
    ///
    /// The method is resolved before the arguments are decoded, so an unknown
    /// method is `Unsupported` whatever the payload looks like.
    pub async fn dispatch_raw(&self, method: &str, raw_args: Option<&str>) -> Outcome {
        if !self.table.contains(method) {
            tracing::debug!("{}: unsupported method {}", self.channel, method);
            return Outcome::Unsupported;
        }

        let args = match raw_args.map(str::trim).filter(|raw| !raw.is_empty()) {
            None => None,
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Null) => None,
                Ok(value) => Some(value),
                Err(e) => {
                    return Outcome::failure(
                        INVALID_ARGUMENTS,
                        format!("could not decode arguments for {}: {}", method, e),
                    );
                }
            },
        };

        self.dispatch(MethodCall {
            method: method.to_string(),
            args,
        })
        .await
    }
}

/// Text of a panic payload, for `INTERNAL_ERROR` messages.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
