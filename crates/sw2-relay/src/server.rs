// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay server core implementation.

use crate::auth::{generate_challenge, AuthError, ConnectionAuth, AUTH_EVENT_KIND};
use crate::config::RelayConfig;
use crate::event::{Event, Filter};
use crate::info::RelayInfo;
use crate::store::{EventStore, SaveOutcome};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sw2_policy::{Decision, PolicyHooks, RequestContext};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod protocol;
pub mod subscriptions;

pub use connection::{ClientConnection, ConnectionError};
pub use protocol::{ClientMessage, RelayMessage};
pub use subscriptions::{ConnectionId, RouterStats, SubscribeError, SubscriptionRouter};

/// Relay server: accepts clients, gates every submission through the
/// policy hooks and fans stored events out to live subscriptions.
#[derive(Clone)]
pub struct RelayServer {
    config: Arc<RelayConfig>,
    info: Arc<RelayInfo>,
    hooks: Arc<dyn PolicyHooks>,
    store: Arc<dyn EventStore>,
    router: Arc<RwLock<SubscriptionRouter>>,
    shutdown: Arc<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
    next_connection_id: Arc<AtomicU64>,
}

impl RelayServer {
    /// Create a new relay server.
    pub fn new(
        config: RelayConfig,
        info: RelayInfo,
        hooks: Arc<dyn PolicyHooks>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            info: Arc::new(info),
            hooks,
            store,
            router: Arc::new(RwLock::new(SubscriptionRouter::new())),
            shutdown: Arc::new(watch::channel(false).0),
            running: Arc::new(AtomicBool::new(false)),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        match listener.local_addr() {
            Ok(addr) => info!("Relay listening on {}", addr),
            Err(e) => warn!("Relay listening on unknown address: {}", e),
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!("New connection from {}", peer_addr);

                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_requested(self.shutdown.subscribe()) => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handle a client connection.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let mut auth = ConnectionAuth::new(generate_challenge()?);
        let (mut conn, writer_task) = ClientConnection::spawn(
            stream,
            peer_addr,
            self.config.max_message_size,
            self.config.outbound_queue,
        );

        self.router.write().await.register(id, conn.outbound());

        self.hooks.on_connect(&auth);
        let result = self.send_pending_challenge(&conn, &mut auth).await;

        let result = match result {
            Ok(()) => self.read_loop(id, &mut conn, &mut auth).await,
            Err(e) => Err(e),
        };

        self.router.write().await.unregister(id);

        // Dropping the last sender lets the writer drain and exit.
        drop(conn);
        if let Err(e) = writer_task.await {
            debug!("Writer task for {} failed: {}", peer_addr, e);
        }

        result
    }

    async fn read_loop(
        &self,
        id: ConnectionId,
        conn: &mut ClientConnection,
        auth: &mut ConnectionAuth,
    ) -> Result<(), ServerError> {
        let peer_addr = conn.peer_addr();
        loop {
            tokio::select! {
                result = conn.read_message() => {
                    match result {
                        Ok(Some(msg)) => {
                            self.process_message(id, conn, auth, msg).await?;
                        }
                        Ok(None) => {
                            info!("Connection closed: {}", peer_addr);
                            return Ok(());
                        }
                        Err(ConnectionError::InvalidMessage(e)) => {
                            debug!("Invalid message from {}: {}", peer_addr, e);
                            conn.send_message(RelayMessage::Notice {
                                message: format!("error: invalid message: {}", e),
                            })
                            .await?;
                        }
                        Err(e) => {
                            warn!("Read error from {}: {}", peer_addr, e);
                            return Ok(());
                        }
                    }
                }
                _ = shutdown_requested(self.shutdown.subscribe()) => {
                    debug!("Connection handler shutting down: {}", peer_addr);
                    return Ok(());
                }
            }
        }
    }

    /// Process a received message.
    async fn process_message(
        &self,
        id: ConnectionId,
        conn: &ClientConnection,
        auth: &mut ConnectionAuth,
        msg: ClientMessage,
    ) -> Result<(), ServerError> {
        match msg {
            ClientMessage::Event { event } => self.handle_event(conn, auth, event).await,

            ClientMessage::Req {
                subscription_id,
                filters,
            } => self.handle_req(id, conn, auth, subscription_id, filters).await,

            ClientMessage::Close { subscription_id } => {
                if self.router.write().await.unsubscribe(id, &subscription_id) {
                    debug!("Closed subscription {} on {}", subscription_id, conn.peer_addr());
                }
                Ok(())
            }

            ClientMessage::Count {
                subscription_id,
                filters,
            } => self.handle_count(conn, auth, subscription_id, filters).await,

            ClientMessage::Auth { event } => {
                let reply = match auth.authenticate(&event, unix_now()) {
                    Ok(identity) => {
                        info!("{} authenticated as {}", conn.peer_addr(), identity);
                        RelayMessage::Ok {
                            event_id: event.id.clone(),
                            accepted: true,
                            message: String::new(),
                        }
                    }
                    Err(e) => {
                        debug!("Authentication from {} failed: {}", conn.peer_addr(), e);
                        RelayMessage::Ok {
                            event_id: event.id.clone(),
                            accepted: false,
                            message: format!("auth-required: {}", e),
                        }
                    }
                };
                conn.send_message(reply).await?;
                Ok(())
            }

            ClientMessage::Info => {
                conn.send_message(RelayMessage::Info((*self.info).clone()))
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_event(
        &self,
        conn: &ClientConnection,
        auth: &ConnectionAuth,
        event: Event,
    ) -> Result<(), ServerError> {
        if event.kind == AUTH_EVENT_KIND {
            debug!("Refused auth event {} submitted for storage", event.id);
            conn.send_message(RelayMessage::Ok {
                event_id: event.id,
                accepted: false,
                message: "blocked: auth events are not stored".into(),
            })
            .await?;
            return Ok(());
        }

        let decision = self.hooks.on_submit_event(&event.pubkey);
        if decision.is_rejected() {
            info!(
                "Rejected event {} from {}: {}",
                event.id,
                event.pubkey,
                decision.reason()
            );
            conn.send_message(RelayMessage::event_decision(&event.id, decision))
                .await?;
            return Ok(());
        }

        match self.store.save_event(&event) {
            Ok(SaveOutcome::Stored) => {
                debug!("Stored event {} (kind {})", event.id, event.kind);
                if event.is_deletion() {
                    self.apply_deletion(&event);
                }
                conn.send_message(RelayMessage::event_decision(&event.id, Decision::Admit))
                    .await?;
                let delivered = self.router.write().await.dispatch(&event);
                if delivered > 0 {
                    debug!("Delivered event {} to {} subscriptions", event.id, delivered);
                }
            }
            Ok(SaveOutcome::Duplicate) => {
                // Unreadable duplicates are acknowledged like a fresh store
                let message = if self.duplicate_visible(&event, auth) {
                    "duplicate: already have this event".into()
                } else {
                    String::new()
                };
                conn.send_message(RelayMessage::Ok {
                    event_id: event.id,
                    accepted: true,
                    message,
                })
                .await?;
            }
            Err(e) => {
                error!("Failed to store event {}: {}", event.id, e);
                conn.send_message(RelayMessage::Ok {
                    event_id: event.id,
                    accepted: false,
                    message: "error: could not store event".into(),
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Whether the submitter may learn that `event` is already stored:
    /// either it may read, or the stored copy has the same author.
    fn duplicate_visible(&self, event: &Event, auth: &ConnectionAuth) -> bool {
        if self.hooks.on_submit_filter(auth).is_admitted() {
            return true;
        }
        match self.store.query_events(&Filter::ids([event.id.as_str()])) {
            Ok(stored) => stored.iter().any(|e| e.pubkey == event.pubkey),
            Err(e) => {
                warn!("Duplicate lookup for {} failed: {}", event.id, e);
                false
            }
        }
    }

    /// Remove the events a deletion references, if they share its author.
    fn apply_deletion(&self, deletion: &Event) {
        let targets: Vec<&str> = deletion.referenced_event_ids().collect();
        if targets.is_empty() {
            return;
        }

        let filter = Filter {
            authors: Some(vec![deletion.pubkey.clone()]),
            ..Filter::ids(targets)
        };
        let owned = match self.store.query_events(&filter) {
            Ok(events) => events,
            Err(e) => {
                warn!("Deletion {} lookup failed: {}", deletion.id, e);
                return;
            }
        };

        for event in owned {
            match self.store.delete_event(&event.id) {
                Ok(true) => debug!("Deleted event {} on request {}", event.id, deletion.id),
                Ok(false) => {}
                Err(e) => warn!("Failed to delete event {}: {}", event.id, e),
            }
        }
    }

    /// Run the read gate; on rejection reply `closed`, queue a challenge if
    /// the connection is still anonymous, and return false.
    async fn admit_filter(
        &self,
        conn: &ClientConnection,
        auth: &mut ConnectionAuth,
        subscription_id: &str,
    ) -> Result<bool, ServerError> {
        let decision = self.hooks.on_submit_filter(&*auth);
        let Some(reason) = decision.deny_reason() else {
            return Ok(true);
        };

        info!(
            "Rejected subscription {} from {}: {}",
            subscription_id,
            conn.peer_addr(),
            reason
        );
        if auth.authenticated_identity().is_none() {
            auth.request_challenge();
        }
        self.send_pending_challenge(conn, auth).await?;
        conn.send_message(RelayMessage::filter_rejected(subscription_id, reason))
            .await?;
        Ok(false)
    }

    async fn handle_req(
        &self,
        id: ConnectionId,
        conn: &ClientConnection,
        auth: &mut ConnectionAuth,
        subscription_id: String,
        filters: Vec<Filter>,
    ) -> Result<(), ServerError> {
        if !self.admit_filter(conn, auth, &subscription_id).await? {
            return Ok(());
        }

        let subscribed = self.router.write().await.subscribe(
            id,
            &subscription_id,
            filters.clone(),
            self.config.max_subscriptions,
        );
        if let Err(e) = subscribed {
            let message = match e {
                SubscribeError::TooManySubscriptions(max) => {
                    format!("error: too many subscriptions (max {})", max)
                }
                SubscribeError::UnknownConnection => "error: connection not registered".into(),
            };
            conn.send_message(RelayMessage::Closed {
                subscription_id,
                message,
            })
            .await?;
            return Ok(());
        }

        let stored = match self.query_stored(&filters) {
            Ok(events) => events,
            Err(e) => {
                error!("Query for {} failed: {}", subscription_id, e);
                self.router.write().await.unsubscribe(id, &subscription_id);
                conn.send_message(RelayMessage::Closed {
                    subscription_id,
                    message: "error: could not query events".into(),
                })
                .await?;
                return Ok(());
            }
        };

        for event in stored {
            conn.send_message(RelayMessage::Event {
                subscription_id: subscription_id.clone(),
                event,
            })
            .await?;
        }
        conn.send_message(RelayMessage::Eose { subscription_id })
            .await?;
        Ok(())
    }

    /// Stored events matching any filter, each limit capped, without repeats.
    fn query_stored(&self, filters: &[Filter]) -> anyhow::Result<Vec<Event>> {
        let max = self.config.max_query_limit;
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for filter in filters {
            let capped = Filter {
                limit: Some(filter.limit.map_or(max, |limit| limit.min(max))),
                ..filter.clone()
            };
            for event in self.store.query_events(&capped)? {
                if seen.insert(event.id.clone()) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    async fn handle_count(
        &self,
        conn: &ClientConnection,
        auth: &mut ConnectionAuth,
        subscription_id: String,
        filters: Vec<Filter>,
    ) -> Result<(), ServerError> {
        if !self.admit_filter(conn, auth, &subscription_id).await? {
            return Ok(());
        }

        let count = match filters.as_slice() {
            [single] => self.store.count_events(single),
            _ => self.count_union(&filters),
        };

        let reply = match count {
            Ok(count) => RelayMessage::Count {
                subscription_id,
                count,
            },
            Err(e) => {
                error!("Count for {} failed: {}", subscription_id, e);
                RelayMessage::Closed {
                    subscription_id,
                    message: "error: could not count events".into(),
                }
            }
        };
        conn.send_message(reply).await?;
        Ok(())
    }

    fn count_union(&self, filters: &[Filter]) -> anyhow::Result<usize> {
        let mut ids = HashSet::new();
        for filter in filters {
            let unlimited = Filter {
                limit: None,
                ..filter.clone()
            };
            ids.extend(self.store.query_events(&unlimited)?.into_iter().map(|e| e.id));
        }
        Ok(ids.len())
    }

    async fn send_pending_challenge(
        &self,
        conn: &ClientConnection,
        auth: &mut ConnectionAuth,
    ) -> Result<(), ServerError> {
        if auth.take_challenge_request() {
            debug!("Sending auth challenge to {}", conn.peer_addr());
            conn.send_message(RelayMessage::Auth {
                challenge: auth.challenge().to_string(),
            })
            .await?;
        }
        Ok(())
    }

    /// Signal the server to shutdown. Latches: also stops a server whose
    /// `serve` has not started yet.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.router.read().await.connection_count()
    }

    /// Get the number of open subscriptions across all clients.
    pub async fn subscription_count(&self) -> usize {
        self.router.read().await.subscription_count()
    }

    /// Get live delivery statistics.
    pub async fn router_stats(&self) -> RouterStats {
        self.router.read().await.stats().clone()
    }
}

/// Resolves once shutdown has been requested, even if that happened before
/// the receiver was created.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    AlreadyRunning,
    Io(String),
    Auth(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "Configuration error: {}", s),
            Self::Bind(s) => write!(f, "Bind error: {}", s),
            Self::AlreadyRunning => write!(f, "Server already running"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Auth(s) => write!(f, "Authentication error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<ConnectionError> for ServerError {
    fn from(e: ConnectionError) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<AuthError> for ServerError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use sw2_policy::OpenPolicy;

    fn test_server() -> RelayServer {
        RelayServer::new(
            RelayConfig::default(),
            RelayInfo::default(),
            Arc::new(OpenPolicy),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_server_error_display() {
        assert_eq!(
            ServerError::AlreadyRunning.to_string(),
            "Server already running"
        );
        let err: ServerError = AuthError::Stale.into();
        assert!(err.to_string().starts_with("Authentication error"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RelayConfig {
            port: 0,
            ..Default::default()
        };
        let result = RelayServer::new(
            config,
            RelayInfo::default(),
            Arc::new(OpenPolicy),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let server = test_server();
        assert!(!server.is_running());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_serve() {
        let server = test_server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), server.serve(listener)).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_while_serving() {
        let server = test_server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[test]
    fn test_query_stored_caps_and_dedupes() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5u64 {
            store
                .save_event(&crate::event::tests::event(&format!("e{}", i), "pub1", i, 1))
                .unwrap();
        }
        let config = RelayConfig {
            max_query_limit: 3,
            ..Default::default()
        };
        let server = RelayServer::new(
            config,
            RelayInfo::default(),
            Arc::new(OpenPolicy),
            store,
        )
        .unwrap();

        let events = server
            .query_stored(&[Filter::default(), Filter::ids(["e4", "e0"])])
            .unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e4", "e3", "e2", "e0"]);

        assert_eq!(
            server
                .count_union(&[Filter::ids(["e1"]), Filter::ids(["e1", "e2"])])
                .unwrap(),
            2
        );
    }
}
