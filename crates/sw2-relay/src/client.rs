// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal relay client.
//!
//! Speaks the same length-prefixed JSON framing as the server. Used by the
//! integration tests and by tools that embed the relay.

use crate::event::{Event, Filter};
use crate::server::connection::{read_frame, write_frame, ConnectionError};
use crate::server::protocol::{ClientMessage, RelayMessage};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_MAX_MESSAGE_SIZE: usize = 512 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay client connection.
pub struct RelayClient {
    stream: TcpStream,
    read_buffer: Vec<u8>,
    max_message_size: usize,
    timeout: Duration,
}

impl RelayClient {
    /// Connect to a relay.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ConnectionError> {
        let stream = timeout(DEFAULT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Protocol(format!("Connect to {} timed out", addr)))??;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(4096),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the per-receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ConnectionError> {
        write_frame(&mut self.stream, msg, self.max_message_size).await
    }

    /// Send any serializable payload as one frame, bypassing message typing.
    pub async fn send_raw<T: Serialize>(&mut self, payload: &T) -> Result<(), ConnectionError> {
        write_frame(&mut self.stream, payload, self.max_message_size).await
    }

    /// Wait for the next relay message.
    pub async fn recv(&mut self) -> Result<RelayMessage, ConnectionError> {
        let read = read_frame(&mut self.stream, &mut self.read_buffer, self.max_message_size);
        match timeout(self.timeout, read).await {
            Ok(Ok(Some(msg))) => Ok(msg),
            Ok(Ok(None)) => Err(ConnectionError::Closed),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectionError::Protocol("Receive timed out".into())),
        }
    }

    /// Publish an event and wait for its `ok` reply.
    ///
    /// Live events that arrive first are skipped.
    pub async fn publish(&mut self, event: Event) -> Result<(bool, String), ConnectionError> {
        self.send(&ClientMessage::Event { event }).await?;
        loop {
            if let RelayMessage::Ok {
                accepted, message, ..
            } = self.recv().await?
            {
                return Ok((accepted, message));
            }
        }
    }

    /// Open a subscription.
    pub async fn subscribe(
        &mut self,
        subscription_id: &str,
        filters: Vec<Filter>,
    ) -> Result<(), ConnectionError> {
        self.send(&ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters,
        })
        .await
    }

    /// Answer a challenge with an auth event.
    pub async fn authenticate(&mut self, event: Event) -> Result<(bool, String), ConnectionError> {
        self.send(&ClientMessage::Auth { event }).await?;
        loop {
            if let RelayMessage::Ok {
                accepted, message, ..
            } = self.recv().await?
            {
                return Ok((accepted, message));
            }
        }
    }
}
