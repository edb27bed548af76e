//! TCP transport speaking newline-delimited JSON.
//!
//! Each accepted socket becomes one connection. Inbound lines are handled
//! strictly in arrival order; outbound messages are written by a separate
//! task draining the connection's [`ChannelSink`].
//!
//! Lines that are not UTF-8 or exceed [`ServerConfig::max_frame_len`] are
//! discarded and the connection stays open. A client that falls
//! [`ServerConfig::outbound_buffer`] messages behind is dropped.
//!
//! [`ServerConfig::max_frame_len`]: crate::ServerConfig::max_frame_len
//! [`ServerConfig::outbound_buffer`]: crate::ServerConfig::outbound_buffer

use crate::connection::ConnectionId;
use crate::error::ServerResult;
use crate::server::LiveDataServer;
use crate::sink::ChannelSink;
use livedata_protocol::ServerMessage;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Serves clients until the listener fails.
pub async fn serve(listener: TcpListener, server: Arc<LiveDataServer>) -> ServerResult<()> {
    serve_with_shutdown(listener, server, std::future::pending()).await
}

/// Serves clients until `shutdown` completes, then disconnects everyone.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    server: Arc<LiveDataServer>,
    shutdown: F,
) -> ServerResult<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    info!(addr = %local, "listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(addr = %local, "shutdown requested");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(err) = handle_stream(server, stream, peer).await {
                            warn!(peer = %peer, error = %err, "connection failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }

    server.shutdown().await;
    Ok(())
}

async fn handle_stream(server: Arc<LiveDataServer>, stream: TcpStream, peer: SocketAddr) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let max_frame_len = server.config().max_frame_len;

    let id = ConnectionId::new();
    let (sink, outbound) = ChannelSink::with_capacity(server.config().outbound_buffer);
    let sink = sink.for_connection(id);
    server.attach(id, Arc::new(sink.clone()))?;
    debug!(connection = %id, peer = %peer, "socket attached");

    let writer_task = tokio::spawn(write_loop(id, writer, outbound));

    let result = tokio::select! {
        result = read_loop(&server, id, reader, max_frame_len) => result,
        _ = sink.overflowed() => {
            warn!(connection = %id, peer = %peer, "client fell behind, dropping it");
            Ok(())
        }
    };
    let overflowed = sink.has_overflowed();
    drop(sink);

    if let Err(err) = server.disconnect(id) {
        debug!(connection = %id, error = %err, "already disconnected");
    }
    if overflowed {
        writer_task.abort();
    }
    match writer_task.await {
        Err(err) if !err.is_cancelled() => {
            debug!(connection = %id, error = %err, "writer ended abnormally");
        }
        _ => {}
    }
    result
}

async fn read_loop(
    server: &LiveDataServer,
    id: ConnectionId,
    reader: OwnedReadHalf,
    max_frame_len: usize,
) -> ServerResult<()> {
    let mut reader = BufReader::new(reader);
    let limit = u64::try_from(max_frame_len).unwrap_or(u64::MAX).saturating_add(1);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut frame).await?;
        if read == 0 {
            break;
        }
        if frame.last() != Some(&b'\n') && frame.len() > max_frame_len {
            warn!(connection = %id, limit = max_frame_len, "discarding oversized frame");
            if !skip_line(&mut reader).await? {
                break;
            }
            continue;
        }
        let line = match std::str::from_utf8(&frame) {
            Ok(line) => line.trim(),
            Err(err) => {
                debug!(connection = %id, error = %err, "discarding frame that is not UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        server.handle_frame(id, line).await?;
    }
    debug!(connection = %id, "peer closed the stream");
    Ok(())
}

/// Consumes input through the next newline. Returns false at end of stream.
async fn skip_line(reader: &mut BufReader<OwnedReadHalf>) -> std::io::Result<bool> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }
        let (used, found) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        if found {
            return Ok(true);
        }
    }
}

async fn write_loop(id: ConnectionId, mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = outbound.recv().await {
        let mut line = match message.encode() {
            Ok(line) => line,
            Err(err) => {
                warn!(connection = %id, kind = message.kind(), error = %err, "dropping unencodable message");
                continue;
            }
        };
        line.push('\n');
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            debug!(connection = %id, error = %err, "write failed, closing writer");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
