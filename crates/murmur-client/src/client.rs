//! The chat client runtime.
//!
//! One tokio task owns the session, the connection manager and the
//! conversation state. [`ChatClient`] is a cheap handle that talks to it over
//! a command channel; transport tasks report back over a second channel
//! tagged with the connection generation they belong to.

use crate::metrics;
use murmur_core::connection::Generation;
use murmur_core::session::{login, logout};
use murmur_core::{
    dispatch_text, reconcile, Action, ChatEvent, ChatMessage, ConnectError, ConnectionManager,
    ConnectionState, CredentialStore, Directive, DispatchOutcome, EventBus, FriendView,
    HistoryLimits, PresenceEntry, ReconnectPolicy, Reconciliation, RosterEntry, Route, Session,
    SessionContext, StoreError, UserProfile,
};
use murmur_protocol::{codec, ClientFrame, ProtocolError, UserId, DEFAULT_ROOM};
use murmur_transport::{endpoint_url, Connector, TransportPair};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 256;

/// Errors returned synchronously by [`ChatClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs an open connection.
    #[error("Not connected")]
    NotConnected,

    /// No token is available to authenticate with.
    #[error("No token available")]
    NoToken,

    /// The session has no user id and username to send as.
    #[error("User identity unavailable")]
    IdentityUnavailable,

    /// Message content is empty or blank.
    #[error("Message content is empty")]
    EmptyContent,

    /// Private message target is empty.
    #[error("Invalid peer id")]
    InvalidPeer,

    /// Credential store failure.
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// Frame encoding failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The runtime task is gone.
    #[error("Client runtime has shut down")]
    Shutdown,
}

impl From<ConnectError> for ClientError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::NoToken => ClientError::NoToken,
        }
    }
}

/// Runtime options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Chat endpoint without the token query.
    pub server_url: String,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// History retention.
    pub history: HistoryLimits,
    /// Event bus capacity per subscriber.
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080/ws/chat".to_string(),
            reconnect: ReconnectPolicy::default(),
            history: HistoryLimits::default(),
            event_capacity: 1024,
        }
    }
}

impl From<&crate::config::ClientConfig> for ClientOptions {
    fn from(config: &crate::config::ClientConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            reconnect: config.reconnect_policy(),
            history: config.history_limits(),
            ..Self::default()
        }
    }
}

type Reply<T> = oneshot::Sender<T>;
type Inspect = Box<dyn FnOnce(&Runtime) + Send>;

enum Command {
    Connect(Reply<Result<(), ClientError>>),
    Disconnect(Reply<()>),
    SendPublic {
        content: String,
        room: String,
        reply: Reply<Result<(), ClientError>>,
    },
    SendPrivate {
        content: String,
        peer: UserId,
        reply: Reply<Result<(), ClientError>>,
    },
    JoinRoom {
        room: String,
        reply: Reply<Result<(), ClientError>>,
    },
    Probe {
        message: String,
        reply: Reply<Result<(), ClientError>>,
    },
    Focus(UserId, Reply<()>),
    Unfocus(Reply<()>),
    MarkRead(UserId, Reply<()>),
    Login {
        token: String,
        profile: UserProfile,
        reply: Reply<Result<Session, ClientError>>,
    },
    Logout(Reply<Result<(), ClientError>>),
    Reconcile(Route, Reply<Reconciliation>),
    Inspect(Inspect),
}

enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug)]
enum TransportEvent {
    Opened(Generation),
    Message(Generation, String),
    Error(Generation, String),
    AuthRejected(Generation),
    Closed(Generation),
}

/// Handle to a running chat client.
#[derive(Clone)]
pub struct ChatClient {
    commands: mpsc::Sender<Command>,
    events: EventBus,
}

impl ChatClient {
    /// Start the runtime on the current tokio runtime.
    ///
    /// The session is reconciled against `store` before the first command
    /// is processed. The returned handle resolves when every [`ChatClient`]
    /// clone has been dropped.
    pub fn spawn(
        options: ClientOptions,
        connector: Arc<dyn Connector>,
        store: Box<dyn CredentialStore>,
    ) -> (Self, JoinHandle<()>) {
        let events = EventBus::with_capacity(options.event_capacity);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let mut runtime = Runtime {
            manager: ConnectionManager::new(options.reconnect),
            ctx: SessionContext::new(None, options.history, events.clone()),
            options,
            connector,
            store,
            session: Session::logged_out(),
            active: None,
            transport_tx,
            reconnect_at: None,
            reported_state: ConnectionState::Disconnected,
        };
        runtime.reconcile(Route::public());

        let handle = tokio::spawn(runtime.run(command_rx, transport_rx));
        (
            Self {
                commands: command_tx,
                events,
            },
            handle,
        )
    }

    /// Subscribe to client events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ClientError::Shutdown)?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    async fn inspect<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&Runtime) -> T + Send + 'static,
    {
        self.request(|reply| {
            Command::Inspect(Box::new(move |runtime: &Runtime| {
                let _ = reply.send(f(runtime));
            }))
        })
        .await
    }

    /// Open the connection using the session token.
    ///
    /// Returns once the attempt has started; the outcome arrives as
    /// [`ChatEvent::Connectivity`] events.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoToken`] when not logged in.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.request(Command::Connect).await?
    }

    /// Close the connection and stop reconnecting.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.request(Command::Disconnect).await
    }

    /// Send a message to a public room. `None` targets the global room.
    ///
    /// # Errors
    ///
    /// Fails when not connected or the content is blank.
    pub async fn send_public(
        &self,
        content: impl Into<String>,
        room: Option<&str>,
    ) -> Result<(), ClientError> {
        let content = content.into();
        let room = room.unwrap_or(DEFAULT_ROOM).to_string();
        self.request(|reply| Command::SendPublic {
            content,
            room,
            reply,
        })
        .await?
    }

    /// Send a private message and append it to the peer's partition.
    ///
    /// # Errors
    ///
    /// Fails when not connected, without a resolved identity, or when the
    /// content is blank. Nothing is sent or stored on failure.
    pub async fn send_private(
        &self,
        content: impl Into<String>,
        peer: impl Into<UserId>,
    ) -> Result<(), ClientError> {
        let content = content.into();
        let peer = peer.into();
        self.request(|reply| Command::SendPrivate {
            content,
            peer,
            reply,
        })
        .await?
    }

    /// Ask the server to join a room.
    ///
    /// # Errors
    ///
    /// Fails when not connected.
    pub async fn join_room(&self, room: impl Into<String>) -> Result<(), ClientError> {
        let room = room.into();
        self.request(|reply| Command::JoinRoom { room, reply }).await?
    }

    /// Send a `test` frame; the server answers with `testResponse`.
    ///
    /// # Errors
    ///
    /// Fails when not connected.
    pub async fn send_probe(&self, message: impl Into<String>) -> Result<(), ClientError> {
        let message = message.into();
        self.request(|reply| Command::Probe { message, reply })
            .await?
    }

    /// Make `peer` the active conversation and clear its unread count.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn focus(&self, peer: impl Into<UserId>) -> Result<(), ClientError> {
        let peer = peer.into();
        self.request(|reply| Command::Focus(peer, reply)).await
    }

    /// Clear the active conversation.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn unfocus(&self) -> Result<(), ClientError> {
        self.request(Command::Unfocus).await
    }

    /// Reset the unread count of `peer`.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn mark_read(&self, peer: impl Into<UserId>) -> Result<(), ClientError> {
        let peer = peer.into();
        self.request(|reply| Command::MarkRead(peer, reply)).await
    }

    /// Persist credentials and adopt the new session.
    ///
    /// An open connection belonging to a previous session is closed.
    ///
    /// # Errors
    ///
    /// Fails on an empty token or username, or a store error.
    pub async fn login(
        &self,
        token: impl Into<String>,
        profile: UserProfile,
    ) -> Result<Session, ClientError> {
        let token = token.into();
        self.request(|reply| Command::Login {
            token,
            profile,
            reply,
        })
        .await?
    }

    /// Disconnect, clear credentials and reset conversation state.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot delete the credentials.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.request(Command::Logout).await?
    }

    /// Reconcile the session against the credential store for `route`.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn reconcile(&self, route: Route) -> Result<Reconciliation, ClientError> {
        self.request(|reply| Command::Reconcile(route, reply)).await
    }

    /// Current session.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn session(&self) -> Result<Session, ClientError> {
        self.inspect(|rt| rt.session.clone()).await
    }

    /// Current connection state.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn state(&self) -> Result<ConnectionState, ClientError> {
        self.inspect(|rt| rt.manager.state()).await
    }

    /// Public history, oldest first.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn public_history(&self) -> Result<Vec<ChatMessage>, ClientError> {
        self.inspect(|rt| rt.ctx.conversations.public_history().to_vec())
            .await
    }

    /// Private history with `peer`, oldest first.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn private_history(
        &self,
        peer: impl Into<UserId>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let peer = peer.into();
        self.inspect(move |rt| rt.ctx.conversations.private_history(&peer).to_vec())
            .await
    }

    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn unread_count(&self, peer: impl Into<UserId>) -> Result<usize, ClientError> {
        let peer = peer.into();
        self.inspect(move |rt| rt.ctx.conversations.unread_count(&peer))
            .await
    }

    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn total_unread(&self) -> Result<usize, ClientError> {
        self.inspect(|rt| rt.ctx.conversations.total_unread()).await
    }

    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn focused(&self) -> Result<Option<UserId>, ClientError> {
        self.inspect(|rt| rt.ctx.conversations.focused().cloned())
            .await
    }

    /// Online users, sorted by id.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn online_users(&self) -> Result<Vec<PresenceEntry>, ClientError> {
        self.inspect(|rt| rt.ctx.presence.snapshot()).await
    }

    /// `roster` enriched with unread counts and online flags.
    ///
    /// # Errors
    ///
    /// Only if the runtime has shut down.
    pub async fn friends_view(
        &self,
        roster: Vec<RosterEntry>,
    ) -> Result<Vec<FriendView>, ClientError> {
        self.inspect(move |rt| rt.ctx.friends_view(&roster)).await
    }
}

struct ActiveTransport {
    generation: Generation,
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
}

struct Runtime {
    options: ClientOptions,
    connector: Arc<dyn Connector>,
    store: Box<dyn CredentialStore>,
    session: Session,
    manager: ConnectionManager,
    ctx: SessionContext,
    active: Option<ActiveTransport>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    reconnect_at: Option<(Generation, Instant)>,
    reported_state: ConnectionState,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Runtime {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        info!(server = %self.options.server_url, "Chat client started");

        loop {
            let deadline = self.reconnect_at.map(|(_, at)| at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = transport_rx.recv() => self.handle_transport(event),
                () = sleep_until(deadline) => self.fire_reconnect(),
            }
            self.report_state();
        }

        let action = self.manager.disconnect();
        self.apply(action);
        info!("Chat client stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let result = self.connect();
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                let action = self.manager.disconnect();
                self.reconnect_at = None;
                self.apply(action);
                let _ = reply.send(());
            }
            Command::SendPublic {
                content,
                room,
                reply,
            } => {
                let result = self.send_public(content, room);
                let _ = reply.send(result);
            }
            Command::SendPrivate {
                content,
                peer,
                reply,
            } => {
                let result = self.send_private(content, peer);
                let _ = reply.send(result);
            }
            Command::JoinRoom { room, reply } => {
                let result = self.send_frame(&ClientFrame::join_room(room));
                let _ = reply.send(result);
            }
            Command::Probe { message, reply } => {
                let result = self.send_frame(&ClientFrame::test(message));
                let _ = reply.send(result);
            }
            Command::Focus(peer, reply) => {
                self.ctx.conversations.focus(&peer);
                let _ = reply.send(());
            }
            Command::Unfocus(reply) => {
                self.ctx.conversations.unfocus();
                let _ = reply.send(());
            }
            Command::MarkRead(peer, reply) => {
                self.ctx.conversations.mark_read(&peer);
                let _ = reply.send(());
            }
            Command::Login {
                token,
                profile,
                reply,
            } => {
                let result = self.login(&token, profile);
                let _ = reply.send(result);
            }
            Command::Logout(reply) => {
                let result = self.logout();
                let _ = reply.send(result);
            }
            Command::Reconcile(route, reply) => {
                let result = self.reconcile(route);
                let _ = reply.send(result);
            }
            Command::Inspect(f) => f(&*self),
        }
    }

    fn connect(&mut self) -> Result<(), ClientError> {
        let has_token = self.session.is_logged_in && self.session.token.is_some();
        let action = self.manager.connect(has_token)?;
        self.reconnect_at = None;
        self.apply(action);
        Ok(())
    }

    fn require_connected(&self) -> Result<(), ClientError> {
        if self.manager.is_connected() && self.active.is_some() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn send_public(&mut self, content: String, room: String) -> Result<(), ClientError> {
        self.require_connected()?;
        if content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }
        self.send_frame(&ClientFrame::message(content, room))
    }

    fn send_private(&mut self, content: String, peer: UserId) -> Result<(), ClientError> {
        self.require_connected()?;
        let identity = self
            .session
            .identity()
            .ok_or(ClientError::IdentityUnavailable)?;
        if content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }
        if peer.is_empty() {
            return Err(ClientError::InvalidPeer);
        }

        self.send_frame(&ClientFrame::private_message(
            content.clone(),
            peer.clone(),
            identity.user_id.clone(),
            identity.username.clone(),
        ))?;

        let message =
            ChatMessage::outgoing_private(identity.user_id, identity.username, peer, content);
        if let Some(append) = self.ctx.conversations.append_private(message.clone()) {
            let unread_count = self.ctx.conversations.unread_count(&append.peer);
            self.ctx.events().publish(ChatEvent::PrivateMessage {
                peer: append.peer,
                message,
                unread_count,
            });
        }
        Ok(())
    }

    fn send_frame(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        self.require_connected()?;
        let text = codec::encode(frame)?;
        let active = self.active.as_ref().ok_or(ClientError::NotConnected)?;

        let bytes = text.len();
        active
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::NotConnected)?;
        metrics::record_frame(bytes, "out");
        debug!(kind = frame.kind(), bytes, "Frame queued");
        Ok(())
    }

    fn login(&mut self, token: &str, profile: UserProfile) -> Result<Session, ClientError> {
        let session = login(self.store.as_mut(), token, profile)?;
        self.adopt(session.clone());
        Ok(session)
    }

    fn logout(&mut self) -> Result<(), ClientError> {
        let action = self.manager.disconnect();
        self.reconnect_at = None;
        self.apply(action);

        let result = logout(self.store.as_mut());
        // The in-memory session is dropped even if the store misbehaved.
        self.adopt(Session::logged_out());
        result.map(|_| ()).map_err(ClientError::from)
    }

    fn reconcile(&mut self, route: Route) -> Reconciliation {
        let result = reconcile(&self.session, self.store.as_mut(), route);
        match result.directive {
            Directive::CommitLogin => self.adopt(result.session.clone()),
            Directive::CommitLogout => {
                let action = self.manager.disconnect();
                self.reconnect_at = None;
                self.apply(action);
                self.adopt(Session::logged_out());
            }
            Directive::None => self.session = result.session.clone(),
        }
        result
    }

    /// Replace the session, resetting conversation state when the identity changes.
    fn adopt(&mut self, session: Session) {
        let was_logged_in = self.session.is_logged_in;
        let identity_changed = self.session.user_id != session.user_id
            || self.session.token != session.token
            || was_logged_in != session.is_logged_in;

        if identity_changed {
            // The open connection, or a pending reconnect, belongs to the old identity.
            let action = self.manager.disconnect();
            self.reconnect_at = None;
            self.apply(action);
            self.ctx.reset(session.user_id.clone());
        }

        self.session = session;
        if was_logged_in != self.session.is_logged_in || identity_changed {
            self.ctx.events().publish(ChatEvent::SessionChanged {
                logged_in: self.session.is_logged_in,
            });
        }
    }

    fn fire_reconnect(&mut self) {
        let Some((generation, _)) = self.reconnect_at.take() else {
            return;
        };
        let has_token = self.session.is_logged_in && self.session.token.is_some();
        let action = self.manager.on_reconnect_timer(generation, has_token);
        self.apply(action);
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(generation) => {
                let action = self.manager.on_open(generation);
                self.apply(action);
            }
            TransportEvent::Message(generation, text) => {
                if generation != self.manager.generation() || !self.manager.is_connected() {
                    debug!(generation, "Dropping frame from stale transport");
                    return;
                }
                metrics::record_frame(text.len(), "in");
                if dispatch_text(&mut self.ctx, &text) == DispatchOutcome::Malformed {
                    metrics::record_malformed();
                }
            }
            TransportEvent::Error(generation, message) => {
                if self.manager.on_error(generation) {
                    metrics::record_error("transport");
                    self.ctx
                        .events()
                        .publish(ChatEvent::TransportError(message));
                }
            }
            TransportEvent::AuthRejected(generation) => {
                let action = self.manager.on_auth_rejected(generation);
                if generation != self.manager.generation() {
                    return;
                }
                self.apply(action);
                self.release(generation);
                warn!(token = %self.session.token_hint(), "Server rejected token, logging out");
                metrics::record_error("auth");
                if let Err(e) = logout(self.store.as_mut()) {
                    error!(error = %e, "Failed to clear credentials");
                }
                self.adopt(Session::logged_out());
                self.ctx.events().publish(ChatEvent::SessionExpired);
            }
            TransportEvent::Closed(generation) => {
                let action = self.manager.on_close(generation);
                self.release(generation);
                self.apply(action);
            }
        }
    }

    /// Drop the handle of a finished transport.
    fn release(&mut self, generation: Generation) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            self.active = None;
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::OpenTransport { generation } => self.open(generation),
            Action::CloseTransport { generation } => {
                if let Some(active) = self.active.take() {
                    if active.generation == generation {
                        let _ = active.outbound.send(Outbound::Close);
                        active.reader.abort();
                    } else {
                        self.active = Some(active);
                    }
                }
            }
            Action::ScheduleReconnect {
                generation,
                delay,
                attempt,
            } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                metrics::record_reconnect();
                self.reconnect_at = Some((generation, Instant::now() + delay));
            }
            Action::GiveUp { attempts } => {
                self.reconnect_at = None;
                self.ctx
                    .events()
                    .publish(ChatEvent::ConnectivityFailed { attempts });
            }
        }
    }

    fn open(&mut self, generation: Generation) {
        let Some(token) = self.session.token.clone() else {
            // The manager only opens with a token; treat a vanished one as a failed handshake.
            let _ = self.transport_tx.send(TransportEvent::Closed(generation));
            return;
        };

        if let Some(stale) = self.active.take() {
            let _ = stale.outbound.send(Outbound::Close);
            stale.reader.abort();
        }

        let url = endpoint_url(&self.options.server_url, &token);
        info!(
            generation,
            transport = self.connector.name(),
            token = %self.session.token_hint(),
            "Connecting"
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(run_transport(
            Arc::clone(&self.connector),
            url,
            generation,
            outbound_rx,
            self.transport_tx.clone(),
        ));
        self.active = Some(ActiveTransport {
            generation,
            outbound: outbound_tx,
            reader,
        });
    }

    fn report_state(&mut self) {
        let state = self.manager.state();
        if state != self.reported_state {
            self.reported_state = state;
            metrics::set_connection_state(state);
            self.ctx.events().publish(ChatEvent::Connectivity(state));
        }
    }
}

/// Dial, then pump inbound frames until the connection ends.
///
/// Outbound frames are written by a separate task so a slow reader never
/// delays a send.
async fn run_transport(
    connector: Arc<dyn Connector>,
    url: String,
    generation: Generation,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let TransportPair { sender, mut receiver } = match connector.connect(&url).await {
        Ok(pair) => pair,
        Err(e) if e.is_auth_rejection() => {
            warn!(generation, error = %e, "Handshake rejected");
            let _ = events.send(TransportEvent::AuthRejected(generation));
            return;
        }
        Err(e) => {
            warn!(generation, error = %e, "Handshake failed");
            let _ = events.send(TransportEvent::Error(generation, e.to_string()));
            let _ = events.send(TransportEvent::Closed(generation));
            return;
        }
    };

    let _ = events.send(TransportEvent::Opened(generation));
    tokio::spawn(run_writer(sender, generation, outbound, events.clone()));

    loop {
        match receiver.recv().await {
            Ok(Some(text)) => {
                if events.send(TransportEvent::Message(generation, text)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!(generation, "Transport closed by server");
                break;
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error(generation, e.to_string()));
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed(generation));
}

async fn run_writer(
    mut sender: Box<dyn murmur_transport::FrameSender>,
    generation: Generation,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(text) => {
                if let Err(e) = sender.send_text(text).await {
                    let _ = events.send(TransportEvent::Error(generation, e.to_string()));
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = sender.close().await {
        debug!(generation, error = %e, "Close failed");
    }
}
