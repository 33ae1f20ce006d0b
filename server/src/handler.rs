//! Connection handling and the session state machine

use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::registry::SessionRegistry;
use crate::session::{now_ms, validate_credentials, SessionError, SessionRecord};
use crate::store::{CredentialStore, FrameSink, SessionStore, User};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_protocol::{
    Authenticate, Message, Packet, Register, Response, ScreenFrame,
};
use vigil_transport::{Acceptor, ChannelError, ChannelReader, ServerConnection};

const EVENT_BUS_CAPACITY: usize = 256;

/// Everything a connection task needs, cheaply cloneable
#[derive(Clone)]
struct Collaborators {
    registry: Arc<SessionRegistry>,
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    frames: Arc<dyn FrameSink>,
    events: broadcast::Sender<ServerEvent>,
}

/// The supervising endpoint.
///
/// Owns the acceptor and spawns one independent task per handshaken
/// connection; a failure in one task never surfaces to another.
pub struct Server {
    acceptor: Acceptor,
    collaborators: Collaborators,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        frames: Arc<dyn FrameSink>,
    ) -> Result<Self, ChannelError> {
        let acceptor =
            Acceptor::bind(config.server.bind, config.server.handshake_timeout()).await?;
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        Ok(Self {
            acceptor,
            collaborators: Collaborators {
                registry: Arc::new(SessionRegistry::new()),
                users,
                sessions,
                frames,
                events,
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Handle to the live-session registry, e.g. for pushing
    /// `FrequencyUpdate` from a management surface
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.collaborators.registry.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.collaborators.events.subscribe()
    }

    /// Consume handshaken connections forever
    pub async fn run(mut self) {
        while let Some(conn) = self.acceptor.accept().await {
            let collaborators = self.collaborators.clone();
            tokio::spawn(handle_connection(conn, collaborators));
        }
    }
}

/// Drive one connection from handshake completion to closure.
///
/// Cleanup runs exactly once, at the end of this function, on every
/// exit path; dropping the channel halves wipes the session keys.
async fn handle_connection(conn: ServerConnection, ctx: Collaborators) {
    let session_id = Uuid::new_v4();
    let peer_addr = conn.peer_addr;
    debug!(%session_id, %peer_addr, "session open");

    let (reader, mut writer) = match conn.channel.split() {
        Ok(halves) => halves,
        Err(e) => {
            // The acceptor only publishes handshaken connections.
            warn!(%session_id, %peer_addr, "rejecting unusable connection: {e}");
            return;
        }
    };

    // All outbound traffic goes through one queue, so replies and
    // asynchronously pushed frequency updates stay serialized.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Packet>();
    ctx.registry.register(session_id, outbound_tx.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(packet) = outbound_rx.recv().await {
            if writer.send(&packet).await.is_err() {
                break;
            }
        }
    });

    let mut state = ConnState {
        session_id,
        peer_addr,
        user: None,
    };

    match read_loop(reader, &mut state, &outbound_tx, &ctx).await {
        Err(SessionError::Channel(ChannelError::Closed)) => {
            debug!(%session_id, "peer closed the connection")
        }
        Err(e) => warn!(%session_id, "session failed: {e}"),
        Ok(()) => unreachable!("read loop only exits with an error"),
    }

    ctx.registry.unregister(session_id);
    drop(outbound_tx);
    let _ = writer_task.await;

    if let Some(user) = state.user.take() {
        ctx.registry.release_login(user.id, session_id);
        info!(%session_id, user = %user.name, "disconnected");
        let _ = ctx.events.send(ServerEvent::Disconnected {
            identity: user.identity(),
        });
    }
    debug!(%session_id, "session closed");
}

struct ConnState {
    session_id: Uuid,
    peer_addr: SocketAddr,

    /// `Some` once authenticated; the transition happens exactly once
    user: Option<User>,
}

async fn read_loop(
    mut reader: ChannelReader<TcpStream>,
    state: &mut ConnState,
    outbound: &UnboundedSender<Packet>,
    ctx: &Collaborators,
) -> Result<(), SessionError> {
    loop {
        let packet = reader.recv().await?;
        dispatch(packet.into_message(), state, outbound, ctx).await?;
    }
}

/// The session state machine: which message kinds are legal depends
/// only on whether the connection has authenticated.
async fn dispatch(
    message: Message,
    state: &mut ConnState,
    outbound: &UnboundedSender<Packet>,
    ctx: &Collaborators,
) -> Result<(), SessionError> {
    match message {
        // The server never expects these inbound, in any state.
        Message::Response(_)
        | Message::FrequencyUpdate(_)
        | Message::RsaPublicKey(_)
        | Message::KeyTransport(_)
        | Message::EncryptedEnvelope(_) => Err(SessionError::Violation(message.kind())),

        Message::Register(register) if state.user.is_none() => {
            handle_register(register, outbound, ctx).await
        }
        Message::Authenticate(auth) if state.user.is_none() => {
            handle_authenticate(auth, state, outbound, ctx).await
        }
        Message::ScreenFrame(_) if state.user.is_none() => {
            // Probing before login is answered, not punished.
            reply(outbound, false, "You need to login first")
        }

        Message::Register(_) | Message::Authenticate(_) => {
            reply(outbound, false, "You've already logged in")
        }
        Message::ScreenFrame(frame) => handle_frame(frame, state, ctx).await,
    }
}

async fn handle_register(
    register: Register,
    outbound: &UnboundedSender<Packet>,
    ctx: &Collaborators,
) -> Result<(), SessionError> {
    if let Err(reason) = validate_credentials(&register.username, &register.password) {
        return reply(outbound, false, &reason);
    }

    match ctx.users.create(&register.username, &register.password).await {
        Ok(user) => {
            info!(user = %user.name, "identity created");
            let _ = ctx.events.send(ServerEvent::IdentityCreated {
                identity: user.identity(),
            });
            reply(outbound, true, "Register success")
        }
        Err(e) => {
            // Duplicate or backend failure; neither leaks which
            // identity collided.
            debug!("register rejected: {e}");
            reply(outbound, false, "Internal server error")
        }
    }
}

async fn handle_authenticate(
    auth: Authenticate,
    state: &mut ConnState,
    outbound: &UnboundedSender<Packet>,
    ctx: &Collaborators,
) -> Result<(), SessionError> {
    let user = match ctx.users.find_by_username(&auth.username).await {
        Ok(Some(user)) if user.password == auth.password => user,
        Ok(_) => return reply(outbound, false, "Invalid credential"),
        Err(e) => {
            warn!("credential lookup failed: {e}");
            return reply(outbound, false, "Internal server error");
        }
    };

    if !ctx.registry.claim_login(user.id, state.session_id) {
        return reply(outbound, false, "User already logged in");
    }

    let record = SessionRecord {
        session_id: state.session_id,
        user_id: user.id,
        ip: state.peer_addr.ip().to_string(),
        client_id: auth.client_id,
        login_time_ms: now_ms(),
    };

    if let Err(e) = ctx.sessions.persist_login(&record).await {
        warn!("failed to persist login: {e}");
        ctx.registry.release_login(user.id, state.session_id);
        return reply(outbound, false, "Internal server error");
    }
    if let Err(e) = ctx.sessions.touch_last_login(user.id, record.login_time_ms).await {
        warn!("failed to update last login: {e}");
    }

    info!(session_id = %state.session_id, user = %user.name, "logged in");
    let _ = ctx.events.send(ServerEvent::LoggedIn {
        identity: user.identity(),
        session_id: state.session_id,
    });

    state.user = Some(user);
    reply(outbound, true, "Login successful")
}

/// Fire-and-forget: frames get no reply
async fn handle_frame(
    frame: ScreenFrame,
    state: &ConnState,
    ctx: &Collaborators,
) -> Result<(), SessionError> {
    if let Err(e) = ctx.frames.store_frame(state.session_id, &frame.image).await {
        warn!(session_id = %state.session_id, "frame sink failed: {e}");
    }
    let _ = ctx.events.send(ServerEvent::FrameReceived {
        session_id: state.session_id,
        bytes: Bytes::from(frame.image),
    });
    Ok(())
}

fn reply(
    outbound: &UnboundedSender<Packet>,
    success: bool,
    message: &str,
) -> Result<(), SessionError> {
    outbound
        .send(Packet::new(Message::Response(Response {
            success,
            message: message.to_string(),
        })))
        .map_err(|_| SessionError::Channel(ChannelError::Closed))
}
