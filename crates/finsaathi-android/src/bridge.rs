// Native bridge: the state behind the JNI exports.
//
// Owns the host shell, a small worker runtime the handlers run on, and the
// reply queue the main thread drains. Kept free of JNI types so it can be
// exercised off-device.

use anyhow::Result;
use std::time::Duration;
use tokio::runtime::Runtime;

use finsaathi_host::config::HostConfig;
use finsaathi_host::shell::HostShell;

use crate::reply_queue::{PendingReply, ReplyQueue};

const WORKER_THREADS: usize = 2;

pub struct NativeBridge {
    runtime: Runtime,
    shell: HostShell,
    replies: ReplyQueue,
}

impl NativeBridge {
    /// Build the worker runtime and configure the host shell.
    pub fn start(config: HostConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("finsaathi-worker")
            .enable_all()
            .build()?;
        let shell = HostShell::configure(config)?;
        log::info!(
            "Native bridge started with {} worker threads",
            WORKER_THREADS
        );
        Ok(Self {
            runtime,
            shell,
            replies: ReplyQueue::new(),
        })
    }

    pub fn shell(&self) -> &HostShell {
        &self.shell
    }

    /// Queue a call for execution. Returns immediately; the reply for `id`
    /// shows up in [`NativeBridge::drain`] once the handler finishes.
    pub fn submit(&self, channel: String, id: i64, method: String, raw_args: Option<String>) {
        let shell = self.shell.clone();
        let replies = self.replies.clone();
        self.runtime.spawn(async move {
            let outcome = shell
                .invoke_raw(&channel, &method, raw_args.as_deref())
                .await;
            if let Err(e) = replies.send(PendingReply::new(id, &outcome)) {
                log::error!("Failed to queue reply for call {}: {:?}", id, e);
            }
        });
    }

    /// Take every finished reply (main thread).
    pub fn drain(&self) -> Vec<PendingReply> {
        self.replies.drain()
    }

    /// Finished replies as a JSON array of `{"id", "envelope"}`.
    pub fn drain_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.drain())?)
    }

    /// Stop the worker runtime. Calls still running are abandoned.
    pub fn shutdown(self) {
        log::info!("Native bridge shutting down");
        self.runtime.shutdown_timeout(Duration::from_secs(1));
    }
}
