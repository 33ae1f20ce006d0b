//! Vigil Client Library
//!
//! The monitored-endpoint side of the protocol: connect, run the
//! initiating-role handshake, register/authenticate, then stream
//! periodic screen frames while honoring frequency updates pushed by
//! the supervising side. Actual screen acquisition stays behind the
//! [`FrameSource`] seam.

pub mod config;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info};
use vigil_protocol::{
    Authenticate, Message, Packet, Register, Response, ScreenFrame,
};
use vigil_transport::{handshake, ChannelError, SecureChannel};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The server answered a request with something other than a
    /// `Response`
    #[error("Unexpected {0} reply from server")]
    UnexpectedReply(&'static str),

    #[error("Frame capture failed: {0}")]
    Capture(#[from] anyhow::Error),
}

/// Produces one captured frame per call.
///
/// Screen-capture acquisition is outside the core; the agent binary
/// ships a synthetic source and real deployments plug in a grabber.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> anyhow::Result<Vec<u8>>;
}

/// A connected, handshaken monitored endpoint
pub struct Client {
    channel: SecureChannel<TcpStream>,

    /// A frequency update that arrived while waiting for a reply;
    /// picked up as the starting period by [`Client::run_monitor`]
    pending_period: Option<Duration>,
}

impl Client {
    /// Connect and run the initiating-role handshake
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ChannelError::Io)?;
        let mut channel = SecureChannel::new(stream);
        handshake::initiate(&mut channel).await?;
        info!(%addr, "connected and handshaken");
        Ok(Self {
            channel,
            pending_period: None,
        })
    }

    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Response, ClientError> {
        self.request(Message::Register(Register {
            username: username.to_string(),
            password: password.to_string(),
        }))
        .await
    }

    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        client_id: &str,
    ) -> Result<Response, ClientError> {
        self.request(Message::Authenticate(Authenticate {
            username: username.to_string(),
            password: password.to_string(),
            client_id: client_id.to_string(),
        }))
        .await
    }

    /// Send one frame, fire-and-forget
    pub async fn send_frame(&mut self, image: Vec<u8>) -> Result<(), ClientError> {
        self.channel
            .send(&Packet::new(Message::ScreenFrame(ScreenFrame {
                image,
                captured_at: now_ms(),
            })))
            .await?;
        Ok(())
    }

    /// Send a request and block for its `Response`.
    ///
    /// A `FrequencyUpdate` pushed concurrently by the server is stashed
    /// rather than lost.
    async fn request(&mut self, message: Message) -> Result<Response, ClientError> {
        self.channel.send(&Packet::new(message)).await?;
        loop {
            match self.channel.recv().await?.into_message() {
                Message::Response(response) => return Ok(response),
                Message::FrequencyUpdate(update) => {
                    self.pending_period = Some(Duration::from_secs(u64::from(update.seconds)));
                }
                other => return Err(ClientError::UnexpectedReply(other.kind())),
            }
        }
    }

    /// Capture-and-send loop for an authenticated client.
    ///
    /// Frames go out once per period; a `FrequencyUpdate` from the
    /// server changes the period from the next tick on. Returns when
    /// the connection dies.
    pub async fn run_monitor<S: FrameSource>(
        self,
        mut source: S,
        initial_period: Duration,
    ) -> Result<(), ClientError> {
        let start_period = self.pending_period.unwrap_or(initial_period);
        let (mut reader, mut writer) = self.channel.split()?;

        let (period_tx, mut period_rx) = watch::channel(start_period);
        let mut reader_task = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(packet) => match packet.into_message() {
                        Message::FrequencyUpdate(update) => {
                            let period = Duration::from_secs(u64::from(update.seconds));
                            info!(seconds = update.seconds, "capture period changed");
                            if period_tx.send(period).is_err() {
                                return ChannelError::Closed;
                            }
                        }
                        other => debug!("ignoring {} from server", other.kind()),
                    },
                    Err(e) => return e,
                }
            }
        });

        loop {
            let period = *period_rx.borrow_and_update();
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    let image = source.capture().await?;
                    debug!(len = image.len(), "sending frame");
                    writer
                        .send(&Packet::new(Message::ScreenFrame(ScreenFrame {
                            image,
                            captured_at: now_ms(),
                        })))
                        .await?;
                }
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        // Reader task ended; surface its error.
                        let err = reader_task
                            .await
                            .unwrap_or(ChannelError::Closed);
                        return Err(err.into());
                    }
                }
                joined = &mut reader_task => {
                    return Err(joined.unwrap_or(ChannelError::Closed).into());
                }
            }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
