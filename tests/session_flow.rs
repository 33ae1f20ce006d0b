//! End-to-end session flow over real TCP connections


use async_trait::async_trait;
use harness::{connect, next_event, request, spawn_server};
use std::time::Duration;
use vigil_client::{Client, FrameSource};
use vigil_protocol::{Authenticate, Message, Register, ScreenFrame};
use vigil_server::ServerEvent;

/// Register, authenticate, stream a frame, receive a frequency push,
/// then disconnect; every step observable on the event bus.
#[tokio::test]
async fn test_full_session_lifecycle() {
    let mut server = spawn_server().await;
    let mut channel = connect(server.addr).await;

    let response = request(
        &mut channel,
        Message::Register(Register {
            username: "alice".into(),
            password: "correct-horse-battery".into(),
        }),
    )
    .await;
    assert!(response.success);
    assert_eq!(response.message, "Register success");

    match next_event(&mut server.events).await {
        ServerEvent::IdentityCreated { identity } => assert_eq!(identity.name, "alice"),
        other => panic!("expected IdentityCreated, got {other:?}"),
    }

    let response = request(
        &mut channel,
        Message::Authenticate(Authenticate {
            username: "alice".into(),
            password: "correct-horse-battery".into(),
            client_id: "aa:bb:cc:dd:ee:ff".into(),
        }),
    )
    .await;
    assert!(response.success);
    assert_eq!(response.message, "Login successful");

    let (identity, session_id) = match next_event(&mut server.events).await {
        ServerEvent::LoggedIn {
            identity,
            session_id,
        } => (identity, session_id),
        other => panic!("expected LoggedIn, got {other:?}"),
    };
    assert_eq!(identity.name, "alice");
    assert!(server.registry.is_logged_in(identity.id));

    // Frames are fire-and-forget; the bus is how they become visible.
    let image = vec![0xA5u8; 512];
    channel
        .send(&vigil_protocol::Packet::new(Message::ScreenFrame(
            ScreenFrame {
                image: image.clone(),
                captured_at: 1,
            },
        )))
        .await
        .unwrap();

    match next_event(&mut server.events).await {
        ServerEvent::FrameReceived {
            session_id: from,
            bytes,
        } => {
            assert_eq!(from, session_id);
            assert_eq!(&bytes[..], &image[..]);
        }
        other => panic!("expected FrameReceived, got {other:?}"),
    }
    assert_eq!(server.frames.frames_for(session_id), vec![image]);

    // Management surface pushes a new capture period to the session.
    assert!(server.registry.send_frequency(session_id, 10));
    match tokio::time::timeout(Duration::from_secs(5), channel.recv())
        .await
        .expect("timed out waiting for the frequency push")
        .unwrap()
        .into_message()
    {
        Message::FrequencyUpdate(update) => assert_eq!(update.seconds, 10),
        other => panic!("expected FrequencyUpdate, got {}", other.kind()),
    }

    drop(channel);
    match next_event(&mut server.events).await {
        ServerEvent::Disconnected { identity } => assert_eq!(identity.name, "alice"),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(!server.registry.is_logged_in(identity.id));
}

/// The same flow through the client library surface.
#[tokio::test]
async fn test_client_library_round_trip() {
    let mut server = spawn_server().await;
    let mut client = Client::connect(&server.addr.to_string())
        .await
        .expect("connect");

    let response = client
        .register("fieldbox", "a-long-enough-password")
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);

    let response = client
        .authenticate("fieldbox", "a-long-enough-password", "00:11:22:33:44:55")
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);

    client.send_frame(vec![1, 2, 3, 4]).await.unwrap();

    let mut frame_session = None;
    loop {
        match next_event(&mut server.events).await {
            ServerEvent::FrameReceived { session_id, bytes } => {
                assert_eq!(&bytes[..], &[1, 2, 3, 4]);
                frame_session = Some(session_id);
                break;
            }
            ServerEvent::IdentityCreated { .. } | ServerEvent::LoggedIn { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(frame_session.is_some());
}

struct PatternSource;

#[async_trait]
impl FrameSource for PatternSource {
    async fn capture(&mut self) -> anyhow::Result<Vec<u8>> {
        Ok(vec![0x42; 16])
    }
}

/// A pushed frequency change takes effect without waiting out the
/// current capture interval.
#[tokio::test]
async fn test_frequency_update_shortens_capture_period() {
    let mut server = spawn_server().await;
    let mut client = Client::connect(&server.addr.to_string())
        .await
        .expect("connect");

    let response = client
        .register("metronome", "a-long-enough-password")
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);
    let response = client
        .authenticate("metronome", "a-long-enough-password", "00:11:22:33:44:55")
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);

    let session_id = loop {
        match next_event(&mut server.events).await {
            ServerEvent::LoggedIn { session_id, .. } => break session_id,
            ServerEvent::IdentityCreated { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    };

    // An hour-long initial period: a frame can only arrive because the
    // pushed update replaced it.
    let monitor = tokio::spawn(client.run_monitor(PatternSource, Duration::from_secs(3600)));
    assert!(server.registry.send_frequency(session_id, 1));

    match next_event(&mut server.events).await {
        ServerEvent::FrameReceived {
            session_id: from,
            bytes,
        } => {
            assert_eq!(from, session_id);
            assert_eq!(&bytes[..], &[0x42; 16]);
        }
        other => panic!("expected FrameReceived, got {other:?}"),
    }
    monitor.abort();
}

/// Only one live session per identity; the claim moves on disconnect.
#[tokio::test]
async fn test_single_session_per_identity() {
    let mut server = spawn_server().await;

    let mut first = connect(server.addr).await;
    let response = request(
        &mut first,
        Message::Register(Register {
            username: "carol".into(),
            password: "password-for-carol".into(),
        }),
    )
    .await;
    assert!(response.success);

    let auth = Message::Authenticate(Authenticate {
        username: "carol".into(),
        password: "password-for-carol".into(),
        client_id: "de:ad:be:ef:00:01".into(),
    });

    let response = request(&mut first, auth.clone()).await;
    assert!(response.success);

    // Second connection with the same identity is turned away.
    let mut second = connect(server.addr).await;
    let response = request(&mut second, auth.clone()).await;
    assert!(!response.success);
    assert_eq!(response.message, "User already logged in");

    // Once the holder disconnects the identity is claimable again.
    drop(first);
    loop {
        if let ServerEvent::Disconnected { identity } = next_event(&mut server.events).await {
            assert_eq!(identity.name, "carol");
            break;
        }
    }

    let response = request(&mut second, auth).await;
    assert!(response.success);
    assert_eq!(response.message, "Login successful");
}
