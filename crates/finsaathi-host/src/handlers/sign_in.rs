use anyhow::Result;
use async_trait::async_trait;
use finsaathi_channel::{GOOGLE_SIGN_IN_ERROR, HandlerResult, MethodError, panic_message};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Log target shared with the sign-in plugin's own diagnostics.
pub const SIGN_IN_TARGET: &str = "GoogleSignIn";

/// Readiness signal of the sign-in capability.
///
/// The real verification belongs to whoever owns the sign-in plugin; the
/// channel only relays what the probe reports.
#[async_trait]
pub trait SignInProbe: Send + Sync {
    async fn readiness(&self) -> Result<bool>;
}

/// Reports a fixed readiness. The sign-in plugin is registered by the app
/// framework itself, so by the time the channel is up it is configured.
#[derive(Debug, Clone, Copy)]
pub struct RegisteredPluginProbe {
    ready: bool,
}

impl RegisteredPluginProbe {
    pub fn new(ready: bool) -> Self {
        Self { ready }
    }
}

impl Default for RegisteredPluginProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl SignInProbe for RegisteredPluginProbe {
    async fn readiness(&self) -> Result<bool> {
        tracing::debug!(target: SIGN_IN_TARGET, "Checking if Google Sign-In is properly configured");
        Ok(self.ready)
    }
}

/// `checkGoogleSignIn`: relay the probe's readiness, or a `GOOGLE_SIGN_IN_ERROR`.
pub fn check_google_sign_in(
    probe: Arc<dyn SignInProbe>,
) -> impl Fn(Option<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static {
    move |_args: Option<Value>| -> BoxFuture<'static, HandlerResult> {
        let probe = probe.clone();
        Box::pin(async move {
            // Any fault inside the check, panics included, is a sign-in error
            let checked = AssertUnwindSafe(probe.readiness()).catch_unwind().await;
            let message = match checked {
                Ok(Ok(ready)) => return Ok(Value::Bool(ready)),
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload),
            };
            tracing::error!(target: SIGN_IN_TARGET, "Error checking Google Sign-In: {}", message);
            if message.trim().is_empty() {
                return Err(MethodError::new(
                    GOOGLE_SIGN_IN_ERROR,
                    "Google Sign-In check failed",
                ));
            }
            Err(MethodError::new(GOOGLE_SIGN_IN_ERROR, message))
        })
    }
}
