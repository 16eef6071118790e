// Channel daemon: serves the host's channels over TCP.
//
// Lets a desktop build of the application layer (or a test harness) talk to
// the native handlers without a device. Every connection gets its own framed
// session over the same immutable registry.

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};

use finsaathi_channel::ChannelServer;

use crate::shell::HostShell;

/// Start the daemon on the given address and serve until the process exits.
pub async fn run_daemon(bind: &str, port: u16, shell: HostShell) -> Result<()> {
    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!("Channel daemon listening on {}:{}", bind, port);

    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::info!("Channel connection from {}", addr);
        let shell = shell.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &shell).await {
                tracing::error!("Channel connection error: {}", e);
            }
            tracing::info!("Channel connection from {} closed", addr);
        });
    }
}

/// Accept and serve a single connection on a pre-bound listener (for tests).
pub async fn start_on_listener(listener: &TcpListener, shell: HostShell) -> Result<()> {
    let (stream, addr) = listener.accept().await?;
    tracing::info!("Channel connection from {}", addr);
    handle_connection(stream, &shell).await
}

async fn handle_connection(stream: TcpStream, shell: &HostShell) -> Result<()> {
    stream.set_nodelay(true)?;
    let (reader, writer) = tokio::io::split(stream);
    let server = ChannelServer::new(shell.registry())
        .with_max_frame_bytes(shell.config().channel.max_frame_bytes);
    server.serve(reader, writer).await
}
