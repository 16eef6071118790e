// Channel registry: the explicit set of channels the host answers on.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::protocol::{MethodCall, Outcome};

/// Returned when two dispatchers claim one channel name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel already registered: {0}")]
pub struct DuplicateChannel(pub String);

/// Channel name → dispatcher. Built by the composition root, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<Dispatcher>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dispatcher: Dispatcher) -> Result<(), DuplicateChannel> {
        let name = dispatcher.channel().to_string();
        if self.channels.contains_key(&name) {
            return Err(DuplicateChannel(name));
        }
        tracing::info!(
            "Registered channel {} ({} methods)",
            name,
            dispatcher.table().len()
        );
        self.channels.insert(name, Arc::new(dispatcher));
        Ok(())
    }

    pub fn get(&self, channel: &str) -> Option<Arc<Dispatcher>> {
        self.channels.get(channel).cloned()
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route a call to its channel. Nobody answers on an unknown channel, so
    /// the call is `Unsupported`.
    pub async fn invoke(&self, channel: &str, call: MethodCall) -> Outcome {
        match self.channels.get(channel) {
            Some(dispatcher) => dispatcher.dispatch(call).await,
            None => {
                tracing::debug!("No handler on channel {} for {}", channel, call.method);
                Outcome::Unsupported
            }
        }
    }

    /// Like [`ChannelRegistry::invoke`] with arguments as JSON text.
    pub async fn invoke_raw(&self, channel: &str, method: &str, raw_args: Option<&str>) -> Outcome {
        match self.channels.get(channel) {
            Some(dispatcher) => dispatcher.dispatch_raw(method, raw_args).await,
            None => {
                tracing::debug!("No handler on channel {} for {}", channel, method);
                Outcome::Unsupported
            }
        }
    }
}
