// Method channel message types: calls, outcomes and their wire encoding

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique call ID.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Name of the channel the host exposes to the application layer.
pub const PERFORMANCE_CHANNEL: &str = "com.finsaathi/performance";

/// Method names understood on [`PERFORMANCE_CHANNEL`].
pub mod methods {
    pub const OPTIMIZE_PERFORMANCE: &str = "optimizePerformance";
    pub const CHECK_GOOGLE_SIGN_IN: &str = "checkGoogleSignIn";
}

// ---------------------------------------------------------------------------
// Failure codes
// ---------------------------------------------------------------------------

pub const GOOGLE_SIGN_IN_ERROR: &str = "GOOGLE_SIGN_IN_ERROR";
/// A handler panicked or was cancelled.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// A handler did not finish within the configured call timeout.
pub const TIMEOUT: &str = "TIMEOUT";
/// Arguments for a known method could not be decoded.
pub const INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";

// ---------------------------------------------------------------------------
// Calls and outcomes
// ---------------------------------------------------------------------------

/// A single request from the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: None,
        }
    }

    pub fn with_args(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args: Some(args),
        }
    }
}

/// A caller-visible failure raised by a handler or by the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct MethodError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl MethodError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The single reply produced for a [`MethodCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(MethodError),
    /// The method (or channel) is not known to this host.
    Unsupported,
}

impl Outcome {
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome::Failure(MethodError::new(code, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Encode as a reply envelope: `[value]`, `[code, message, details]` or `null`.
    pub fn to_envelope(&self) -> Value {
        match self {
            Outcome::Success(value) => Value::Array(vec![value.clone()]),
            Outcome::Failure(err) => Value::Array(vec![
                Value::String(err.code.clone()),
                Value::String(err.message.clone()),
                err.details.clone().unwrap_or(Value::Null),
            ]),
            Outcome::Unsupported => Value::Null,
        }
    }

    /// Decode a reply envelope produced by [`Outcome::to_envelope`].
    pub fn from_envelope(envelope: Value) -> anyhow::Result<Self> {
        match envelope {
            Value::Null => Ok(Outcome::Unsupported),
            Value::Array(mut items) if items.len() == 1 => Ok(Outcome::Success(items.remove(0))),
            Value::Array(items) if items.len() == 3 => {
                let mut items = items.into_iter();
                let code = match items.next() {
                    Some(Value::String(code)) => code,
                    other => anyhow::bail!("error envelope code must be a string, got {:?}", other),
                };
                let message = match items.next() {
                    Some(Value::String(message)) => message,
                    Some(Value::Null) => String::new(),
                    other => {
                        anyhow::bail!("error envelope message must be a string, got {:?}", other)
                    }
                };
                let details = items.next().filter(|d| !d.is_null());
                Ok(Outcome::Failure(MethodError {
                    code,
                    message,
                    details,
                }))
            }
            other => anyhow::bail!("malformed reply envelope: {}", other),
        }
    }
}

impl From<Result<Value, MethodError>> for Outcome {
    fn from(result: Result<Value, MethodError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream frames
// ---------------------------------------------------------------------------

/// A call addressed to a channel, as carried by the stream transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFrame {
    pub id: u64,
    pub channel: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl CallFrame {
    pub fn new(channel: impl Into<String>, call: MethodCall) -> Self {
        Self {
            id: next_id(),
            channel: channel.into(),
            method: call.method,
            args: call.args,
        }
    }

    pub fn into_call(self) -> (u64, String, MethodCall) {
        let call = MethodCall {
            method: self.method,
            args: self.args,
        };
        (self.id, self.channel, call)
    }
}

/// The reply to the [`CallFrame`] with the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: u64,
    pub envelope: Value,
}

impl ReplyFrame {
    pub fn new(id: u64, outcome: &Outcome) -> Self {
        Self {
            id,
            envelope: outcome.to_envelope(),
        }
    }
}

/// Envelope: any frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Call(CallFrame),
    Reply(ReplyFrame),
}
