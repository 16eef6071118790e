// Host shell: the composition root of the native side.
//
// Builds every handler with its collaborators, puts them in the method table
// of the performance channel and registers that channel. Nothing is picked up
// implicitly; what is not wired here is not reachable from the app.

use anyhow::Result;
use std::sync::Arc;

use finsaathi_channel::{
    ChannelRegistry, Dispatcher, MethodCall, MethodTable, Outcome, methods,
};

use crate::config::HostConfig;
use crate::handlers::{
    PerformanceTuner, RegisteredPluginProbe, SIGN_IN_TARGET, SignInProbe, StartupTuner,
    check_google_sign_in, optimize_performance,
};

/// Collaborators the handlers delegate to.
#[derive(Clone)]
pub struct HostServices {
    pub tuner: Arc<dyn PerformanceTuner>,
    pub sign_in: Arc<dyn SignInProbe>,
}

impl HostServices {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            tuner: Arc::new(StartupTuner),
            sign_in: Arc::new(RegisteredPluginProbe::new(config.sign_in_ready)),
        }
    }
}

/// Build the method table of the performance channel.
pub fn performance_table(services: &HostServices) -> Result<MethodTable> {
    let mut table = MethodTable::builder();
    table.register(
        methods::OPTIMIZE_PERFORMANCE,
        optimize_performance(services.tuner.clone()),
    )?;
    table.register(
        methods::CHECK_GOOGLE_SIGN_IN,
        check_google_sign_in(services.sign_in.clone()),
    )?;
    Ok(table.build())
}

/// The configured native side: every channel the app can call.
#[derive(Debug, Clone)]
pub struct HostShell {
    config: HostConfig,
    registry: Arc<ChannelRegistry>,
}

impl HostShell {
    /// Configure with the default collaborators.
    pub fn configure(config: HostConfig) -> Result<Self> {
        let services = HostServices::from_config(&config);
        Self::with_services(config, services)
    }

    /// Configure with explicit collaborators.
    pub fn with_services(config: HostConfig, services: HostServices) -> Result<Self> {
        tracing::debug!(target: SIGN_IN_TARGET, "Configuring host channels for Google Sign-In");
        tracing::debug!(target: SIGN_IN_TARGET, "Sign-in plugin should be registered by the app framework");

        let table = performance_table(&services)?;
        let mut registry = ChannelRegistry::new();
        registry.register(Dispatcher::from_config(&config.channel, table))?;

        tracing::info!("Host shell configured on channel {}", config.channel.name);
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Route a call to the named channel.
    pub async fn invoke(&self, channel: &str, call: MethodCall) -> Outcome {
        self.registry.invoke(channel, call).await
    }

    /// Route a call whose arguments are JSON text.
    pub async fn invoke_raw(&self, channel: &str, method: &str, raw_args: Option<&str>) -> Outcome {
        self.registry.invoke_raw(channel, method, raw_args).await
    }

    /// Channel names with their method names, for diagnostics.
    pub fn describe(&self) -> Vec<(String, Vec<String>)> {
        self.registry
            .channels()
            .into_iter()
            .filter_map(|name| {
                let dispatcher = self.registry.get(name)?;
                let methods = dispatcher
                    .table()
                    .methods()
                    .into_iter()
                    .map(String::from)
                    .collect();
                Some((name.to_string(), methods))
            })
            .collect()
    }
}
