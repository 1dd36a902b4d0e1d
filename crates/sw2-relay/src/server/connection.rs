// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client connection handling.
//!
//! The socket is split: the connection task reads frames, and a dedicated
//! writer task drains an outbound queue shared with the subscription router,
//! so replies and live events never interleave mid-frame.

use super::protocol::{ClientMessage, RelayMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame was read completely but did not decode; the stream is still usable.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Connection closed")]
    Closed,
}

/// Read one length-prefixed JSON frame.
///
/// Returns `Ok(None)` if the peer closed the connection between frames.
pub async fn read_frame<R, T>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    max_message_size: usize,
) -> Result<Option<T>, ConnectionError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    // Read length prefix (4 bytes, big-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(ConnectionError::Protocol("Empty message".into()));
    }
    if len > max_message_size {
        return Err(ConnectionError::Protocol(format!(
            "Message too large: {} > {}",
            len, max_message_size
        )));
    }

    buffer.clear();
    buffer.resize(len, 0);
    reader.read_exact(buffer).await?;

    serde_json::from_slice(buffer)
        .map(Some)
        .map_err(|e| ConnectionError::InvalidMessage(e.to_string()))
}

/// Write one length-prefixed JSON frame and flush.
pub async fn write_frame<W, T>(
    writer: &mut W,
    msg: &T,
    max_message_size: usize,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)
        .map_err(|e| ConnectionError::Protocol(format!("Serialize error: {}", e)))?;

    if json.len() > max_message_size {
        return Err(ConnectionError::Protocol(format!(
            "Message too large: {} > {}",
            json.len(),
            max_message_size
        )));
    }

    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// A connected client.
pub struct ClientConnection {
    reader: OwnedReadHalf,
    peer_addr: SocketAddr,
    max_message_size: usize,
    read_buffer: Vec<u8>,
    outbound: mpsc::Sender<RelayMessage>,
}

impl ClientConnection {
    /// Wrap a stream and spawn its writer task.
    pub fn spawn(
        stream: TcpStream,
        peer_addr: SocketAddr,
        max_message_size: usize,
        outbound_queue: usize,
    ) -> (Self, JoinHandle<()>) {
        let (reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<RelayMessage>(outbound_queue);

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &msg, max_message_size).await {
                    warn!("Failed to send to {}: {}", peer_addr, e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Writer for {} finished", peer_addr);
        });

        let conn = Self {
            reader,
            peer_addr,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
            outbound: tx,
        };
        (conn, writer_task)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Sender feeding this connection's writer task.
    pub fn outbound(&self) -> mpsc::Sender<RelayMessage> {
        self.outbound.clone()
    }

    /// Read a message from the client.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully.
    pub async fn read_message(&mut self) -> Result<Option<ClientMessage>, ConnectionError> {
        read_frame(&mut self.reader, &mut self.read_buffer, self.max_message_size).await
    }

    /// Queue a message for the client.
    pub async fn send_message(&self, msg: RelayMessage) -> Result<(), ConnectionError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ConnectionError::Closed)
    }
}
