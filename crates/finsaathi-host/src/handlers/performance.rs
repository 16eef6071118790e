use anyhow::Result;
use finsaathi_channel::HandlerResult;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Host-specific startup/runtime adjustment applied on request.
pub trait PerformanceTuner: Send + Sync {
    fn apply(&self) -> Result<()>;
}

/// Default tuner. The Android shell applies its window and startup tweaks
/// before the engine starts, so there is nothing left to adjust here.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartupTuner;

impl PerformanceTuner for StartupTuner {
    fn apply(&self) -> Result<()> {
        tracing::debug!("Startup tuning already applied");
        Ok(())
    }
}

/// `optimizePerformance`: attempt the adjustment, always report `true`.
///
/// The reply does not distinguish an applied adjustment from a no-op or a
/// failed attempt; failures are only logged.
pub fn optimize_performance(
    tuner: Arc<dyn PerformanceTuner>,
) -> impl Fn(Option<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static {
    move |_args: Option<Value>| -> BoxFuture<'static, HandlerResult> {
        let tuner = tuner.clone();
        Box::pin(async move {
            if let Err(e) = tuner.apply() {
                tracing::warn!("Performance adjustment failed: {}", e);
            }
            Ok(Value::Bool(true))
        })
    }
}
