// Transport layer: length-delimited channel frames over any async stream.
//
// Each frame is: [4-byte big-endian length][JSON payload]
// This works over TCP, Unix sockets, or a pipe to the application runtime.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::config::DEFAULT_MAX_FRAME_BYTES;
use crate::protocol::{CallFrame, Frame, MethodCall, Outcome, ReplyFrame};
use crate::registry::ChannelRegistry;

/// Framed writer: serialize + length-prefix a frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &impl serde::Serialize,
) -> Result<()> {
    let payload = serde_json::to_vec(frame)?;
    write_payload(writer, &payload).await
}

async fn write_payload<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("frame too large: {} bytes", payload.len()))?
        .to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed payload, refusing anything over `max_len` bytes.
pub async fn read_payload<R: AsyncReadExt + Unpin>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_len {
        anyhow::bail!("frame too large: {} bytes", len);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Framed reader: read length-prefix + JSON frame.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Frame> {
    let payload = read_payload(reader, DEFAULT_MAX_FRAME_BYTES).await?;
    Ok(serde_json::from_slice(&payload)?)
}

// ---------------------------------------------------------------------------
// Channel server: answers calls from the application runtime
// ---------------------------------------------------------------------------

/// Serves every channel of a registry over one framed stream.
pub struct ChannelServer {
    registry: Arc<ChannelRegistry>,
    max_frame_bytes: usize,
}

impl ChannelServer {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Serve a single connection until EOF, an I/O error, or the reply
    /// writer stopping.
    ///
    /// Calls are dispatched concurrently and each reply is written as soon as
    /// it is ready; replies carry the id of their call.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncReadExt + Unpin + Send,
        W: AsyncWriteExt + Unpin + Send + 'static,
    {
        let (reply_tx, mut reply_rx) = mpsc::channel::<ReplyFrame>(64);

        // Writer task
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(reply) = reply_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &reply).await {
                    tracing::warn!("Failed to write reply {}: {}", reply.id, e);
                    break;
                }
            }
        });

        loop {
            let read = tokio::select! {
                read = read_payload(&mut reader, self.max_frame_bytes) => read,
                _ = reply_tx.closed() => {
                    tracing::warn!("Reply writer stopped; ending channel session");
                    break;
                }
            };
            let payload = match read {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::debug!("Channel session ended: {}", e);
                    break;
                }
            };

            let frame = match serde_json::from_slice::<Frame>(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Skipping undecodable frame: {}", e);
                    continue;
                }
            };

            match frame {
                Frame::Call(call) => {
                    let registry = self.registry.clone();
                    let reply_tx = reply_tx.clone();
                    tokio::spawn(async move {
                        let (id, channel, call) = call.into_call();
                        let outcome = registry.invoke(&channel, call).await;
                        if reply_tx.send(ReplyFrame::new(id, &outcome)).await.is_err() {
                            tracing::warn!("Reply {} dropped: writer closed", id);
                        }
                    });
                }
                Frame::Reply(_) => {
                    // The host never issues calls; ignore stray replies
                }
            }
        }

        // In-flight calls still hold senders; the writer drains them before exiting.
        drop(reply_tx);
        let _ = writer_task.await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Channel client: the application side of the stream
// ---------------------------------------------------------------------------

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Outcome>>>>;

/// Multiplexed channel client over a framed stream.
pub struct ChannelClient {
    tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

impl ChannelClient {
    /// Spawn a client over a split read/write stream.
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncReadExt + Unpin + Send + 'static,
        W: AsyncWriteExt + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(64);

        // Writer task
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(payload) = write_rx.recv().await {
                if write_payload(&mut writer, &payload).await.is_err() {
                    break;
                }
            }
        });

        // Reader task
        let pending_clone = pending.clone();
        let closed_clone = closed.clone();
        tokio::spawn(async move {
            let mut reader = reader;
            loop {
                match read_frame(&mut reader).await {
                    Ok(Frame::Reply(reply)) => {
                        let Some(tx) = pending_clone.lock().await.remove(&reply.id) else {
                            continue;
                        };
                        // A malformed envelope drops the sender, failing that call
                        match Outcome::from_envelope(reply.envelope) {
                            Ok(outcome) => {
                                let _ = tx.send(outcome);
                            }
                            Err(e) => tracing::warn!("Malformed reply {}: {}", reply.id, e),
                        }
                    }
                    Ok(Frame::Call(_)) => {
                        // The host never calls into the client; ignore
                    }
                    Err(_) => break,
                }
            }
            // Dropping the senders fails every waiting call
            let mut map = pending_clone.lock().await;
            closed_clone.store(true, Ordering::Release);
            map.clear();
        });

        Self {
            tx: write_tx,
            pending,
            closed,
        }
    }

    /// Send a call and wait for its outcome.
    pub async fn invoke(&self, channel: impl Into<String>, call: MethodCall) -> Result<Outcome> {
        let frame = CallFrame::new(channel, call);
        let id = frame.id;

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            if self.closed.load(Ordering::Acquire) {
                anyhow::bail!("transport closed");
            }
            map.insert(id, tx);
        }

        let payload = serde_json::to_vec(&frame)?;
        if self.tx.send(payload).await.is_err() {
            self.pending.lock().await.remove(&id);
            anyhow::bail!("transport closed");
        }

        rx.await
            .map_err(|_| anyhow::anyhow!("reply channel dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, MethodTable};
    use serde_json::json;
    use tokio::io::duplex;

    fn echo_registry() -> Arc<ChannelRegistry> {
        let mut table = MethodTable::builder();
        table
            .register("echo", |args| {
                Box::pin(async move { Ok(args.unwrap_or(serde_json::Value::Null)) })
            })
            .unwrap();
        let mut registry = ChannelRegistry::new();
        registry
            .register(Dispatcher::new("test/echo", table.build()))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn framed_roundtrip() {
        let (mut client, mut server) = duplex(1024);

        let call = CallFrame::new("test/echo", MethodCall::with_args("echo", json!({"k": 1})));
        write_frame(&mut client, &call).await.unwrap();

        match read_frame(&mut server).await.unwrap() {
            Frame::Call(c) => {
                assert_eq!(c.method, "echo");
                assert_eq!(c.channel, "test/echo");
            }
            _ => panic!("expected call"),
        }
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&1024u32.to_be_bytes()).await.unwrap();
        let err = read_payload(&mut server, 16).await.unwrap_err();
        assert!(err.to_string().contains("frame too large"));
    }

    #[tokio::test]
    async fn client_server_call() {
        let (client_stream, server_stream) = duplex(4096);
        let (cr, cw) = tokio::io::split(client_stream);
        let (sr, sw) = tokio::io::split(server_stream);

        let server = ChannelServer::new(echo_registry());
        let server_handle = tokio::spawn(async move {
            let _ = server.serve(sr, sw).await;
        });

        let client = ChannelClient::spawn(cr, cw);
        let outcome = client
            .invoke("test/echo", MethodCall::with_args("echo", json!({"hello": "world"})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success(json!({"hello": "world"})));

        server_handle.abort();
    }

    #[tokio::test]
    async fn client_method_not_found() {
        let (client_stream, server_stream) = duplex(4096);
        let (cr, cw) = tokio::io::split(client_stream);
        let (sr, sw) = tokio::io::split(server_stream);

        let server = ChannelServer::new(echo_registry());
        let server_handle = tokio::spawn(async move {
            let _ = server.serve(sr, sw).await;
        });

        let client = ChannelClient::spawn(cr, cw);
        let outcome = client
            .invoke("test/echo", MethodCall::new("nonexistent"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Unsupported);

        server_handle.abort();
    }

    #[tokio::test]
    async fn server_skips_garbage_frames() {
        let (client_stream, server_stream) = duplex(4096);
        let (mut cr, mut cw) = tokio::io::split(client_stream);
        let (sr, sw) = tokio::io::split(server_stream);

        let server = ChannelServer::new(echo_registry());
        let server_handle = tokio::spawn(async move {
            let _ = server.serve(sr, sw).await;
        });

        write_payload(&mut cw, b"not json").await.unwrap();
        let call = CallFrame::new("test/echo", MethodCall::new("echo"));
        let id = call.id;
        write_frame(&mut cw, &call).await.unwrap();

        match read_frame(&mut cr).await.unwrap() {
            Frame::Reply(reply) => {
                assert_eq!(reply.id, id);
                assert_eq!(reply.envelope, json!([null]));
            }
            _ => panic!("expected reply"),
        }

        server_handle.abort();
    }

    #[tokio::test]
    async fn concurrent_replies_reach_their_own_calls() {
        let (client_stream, server_stream) = duplex(64 * 1024);
        let (cr, cw) = tokio::io::split(client_stream);
        let (sr, sw) = tokio::io::split(server_stream);

        let mut table = MethodTable::builder();
        table
            .register("delayed_echo", |args| {
                Box::pin(async move {
                    let args = args.unwrap_or(serde_json::Value::Null);
                    // Later calls finish first, so replies go out in reverse order
                    let seq = args["seq"].as_u64().unwrap_or(0);
                    tokio::time::sleep(std::time::Duration::from_millis(200 - seq)).await;
                    Ok(args)
                })
            })
            .unwrap();
        let mut registry = ChannelRegistry::new();
        registry
            .register(Dispatcher::new("test/echo", table.build()))
            .unwrap();

        let server = ChannelServer::new(Arc::new(registry));
        let server_handle = tokio::spawn(async move {
            let _ = server.serve(sr, sw).await;
        });

        let client = Arc::new(ChannelClient::spawn(cr, cw));
        let mut tasks = Vec::new();
        for seq in 0..128u64 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = client
                    .invoke(
                        "test/echo",
                        MethodCall::with_args("delayed_echo", json!({ "seq": seq })),
                    )
                    .await
                    .unwrap();
                (seq, outcome)
            }));
        }

        for task in tasks {
            let (seq, outcome) = task.await.unwrap();
            assert_eq!(outcome, Outcome::Success(json!({ "seq": seq })));
        }

        server_handle.abort();
    }

    #[tokio::test]
    async fn session_ends_when_reply_writer_fails() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);
        drop(client_in);

        let server = ChannelServer::new(echo_registry());
        let session = tokio::spawn(async move { server.serve(server_in, server_out).await });

        // The input side stays open; only the failed reply write ends the session
        let call = CallFrame::new("test/echo", MethodCall::new("echo"));
        write_frame(&mut client_out, &call).await.unwrap();

        let ended = tokio::time::timeout(std::time::Duration::from_secs(5), session).await;
        assert!(ended.is_ok(), "session kept reading after its writer stopped");
        drop(client_out);
    }

    #[tokio::test]
    async fn pending_calls_fail_when_server_goes_away() {
        let (client_stream, server_stream) = duplex(4096);
        let (cr, cw) = tokio::io::split(client_stream);

        let client = ChannelClient::spawn(cr, cw);
        drop(server_stream);

        assert!(
            client
                .invoke("test/echo", MethodCall::new("echo"))
                .await
                .is_err()
        );
    }
}
