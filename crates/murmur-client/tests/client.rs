//! End-to-end tests driving `ChatClient` through the in-memory connector.

use murmur_client::{ChatClient, ClientError, ClientOptions, FileCredentialStore};
use murmur_core::session::login;
use murmur_core::{
    Access, ChatEvent, ConnectionState, CredentialStore, Directive, MemoryCredentialStore,
    ReconnectPolicy, RosterEntry, Route, UserProfile,
};
use murmur_protocol::{ClientFrame, PresenceUser, ServerFrame, UserId};
use murmur_transport::{MemoryConnector, MemoryPeer, MemoryServer, Refusal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn credentials(user_id: &str, username: &str) -> MemoryCredentialStore {
    let mut store = MemoryCredentialStore::new();
    login(&mut store, "tok-123456789", UserProfile::new(user_id, username)).unwrap();
    store
}

fn options() -> ClientOptions {
    ClientOptions {
        server_url: "ws://chat.test/ws/chat".into(),
        reconnect: ReconnectPolicy {
            delay: Duration::from_millis(100),
            max_attempts: 2,
        },
        ..ClientOptions::default()
    }
}

fn spawn(store: impl CredentialStore + 'static) -> (ChatClient, MemoryServer) {
    let (connector, server) = MemoryConnector::new();
    let (client, _task) = ChatClient::spawn(options(), Arc::new(connector), Box::new(store));
    (client, server)
}

async fn wait_for(
    events: &mut broadcast::Receiver<ChatEvent>,
    mut pred: impl FnMut(&ChatEvent) -> bool,
) -> ChatEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_for_state(events: &mut broadcast::Receiver<ChatEvent>, state: ConnectionState) {
    wait_for(events, |e| *e == ChatEvent::Connectivity(state)).await;
}

/// Logged in as user 1 "alice" and connected.
async fn connected() -> (
    ChatClient,
    MemoryServer,
    MemoryPeer,
    broadcast::Receiver<ChatEvent>,
) {
    let (client, mut server) = spawn(credentials("1", "alice"));
    let mut events = client.subscribe();
    client.connect().await.unwrap();
    let peer = server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;
    (client, server, peer, events)
}

#[tokio::test]
async fn test_connect_uses_stored_token() {
    let (client, server, peer, _events) = connected().await;

    assert_eq!(peer.url(), "ws://chat.test/ws/chat?token=tok-123456789");
    assert_eq!(server.attempts(), 1);
    assert_eq!(client.state().await.unwrap(), ConnectionState::Connected);

    // A second connect while connected opens nothing new.
    client.connect().await.unwrap();
    assert_eq!(server.attempts(), 1);
}

#[tokio::test]
async fn test_connect_without_token_fails_fast() {
    let (client, server) = spawn(MemoryCredentialStore::new());

    assert!(matches!(client.connect().await, Err(ClientError::NoToken)));
    assert_eq!(server.attempts(), 0);
    assert_eq!(client.state().await.unwrap(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_private_send_while_disconnected_has_no_effect() {
    let (client, server) = spawn(credentials("u1", "alice"));

    let result = client.send_private("hi", "u2").await;

    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(server.attempts(), 0);
    assert!(client.private_history("u2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_public_message_round_trip() {
    let (client, _server, mut peer, mut events) = connected().await;

    client.send_public("hello room", None).await.unwrap();
    assert_eq!(
        peer.recv_frame().await,
        Some(ClientFrame::message("hello room", "global"))
    );

    // Public sends wait for the server broadcast.
    assert!(client.public_history().await.unwrap().is_empty());

    peer.send_frame(&ServerFrame::new_message("1", "alice", "hello room"));
    let event = wait_for(&mut events, |e| matches!(e, ChatEvent::PublicMessage(_))).await;
    let ChatEvent::PublicMessage(message) = event else {
        unreachable!()
    };
    assert_eq!(message.content, "hello room");
    assert_eq!(client.public_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_private_send_appends_optimistically() {
    let (client, _server, mut peer, _events) = connected().await;

    client.send_private("hi bob", "2").await.unwrap();

    assert_eq!(
        peer.recv_frame().await,
        Some(ClientFrame::private_message(
            "hi bob",
            UserId::from("2"),
            UserId::from("1"),
            "alice"
        ))
    );
    let history = client.private_history("2").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi bob");
    assert!(history[0].id.as_str().starts_with("local-"));
    assert_eq!(client.unread_count("2").await.unwrap(), 0);
}

#[tokio::test]
async fn test_blank_content_is_rejected_locally() {
    let (client, _server, mut peer, _events) = connected().await;

    assert!(matches!(
        client.send_public("   ", None).await,
        Err(ClientError::EmptyContent)
    ));
    assert!(matches!(
        client.send_private("", "2").await,
        Err(ClientError::EmptyContent)
    ));

    client.send_probe("marker").await.unwrap();
    assert_eq!(peer.recv_frame().await, Some(ClientFrame::test("marker")));
    assert!(client.private_history("2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_private_send_requires_identity() {
    let mut store = MemoryCredentialStore::new();
    let profile = UserProfile {
        user_id: None,
        username: "alice".into(),
    };
    login(&mut store, "tok", profile).unwrap();

    let (client, mut server) = spawn(store);
    let mut events = client.subscribe();
    client.connect().await.unwrap();
    let mut peer = server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    assert!(matches!(
        client.send_private("hi", "2").await,
        Err(ClientError::IdentityUnavailable)
    ));

    client.join_room("lobby").await.unwrap();
    assert_eq!(peer.recv_frame().await, Some(ClientFrame::join_room("lobby")));
}

#[tokio::test]
async fn test_inbound_private_unread_and_focus() {
    let (client, _server, peer, mut events) = connected().await;

    peer.send_frame(&ServerFrame::private_message("2", "bob", "1", "hey"));
    let event = wait_for(&mut events, |e| matches!(e, ChatEvent::PrivateMessage { .. })).await;
    assert!(matches!(
        event,
        ChatEvent::PrivateMessage { ref peer, unread_count: 1, .. } if *peer == UserId::from("2")
    ));
    assert_eq!(client.total_unread().await.unwrap(), 1);

    client.focus("2").await.unwrap();
    assert_eq!(client.unread_count("2").await.unwrap(), 0);
    assert_eq!(client.focused().await.unwrap(), Some(UserId::from("2")));

    peer.send_frame(&ServerFrame::private_message("2", "bob", "1", "still there?"));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PrivateMessage { .. })).await;
    assert_eq!(client.unread_count("2").await.unwrap(), 0);

    client.unfocus().await.unwrap();
    peer.send_frame(&ServerFrame::private_message("2", "bob", "1", "hello?"));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PrivateMessage { .. })).await;
    assert_eq!(client.unread_count("2").await.unwrap(), 1);

    client.mark_read("2").await.unwrap();
    assert_eq!(client.unread_count("2").await.unwrap(), 0);
    assert_eq!(client.private_history("2").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_presence_and_friends_view() {
    let (client, _server, peer, mut events) = connected().await;

    peer.send_frame(&ServerFrame::online_users(vec![
        PresenceUser::new("2", "bob"),
        PresenceUser::new("3", "carol"),
        PresenceUser::new("2", "bob"),
    ]));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PresenceSnapshot(_))).await;

    peer.send_frame(&ServerFrame::user_offline("3", "carol"));
    peer.send_frame(&ServerFrame::user_online("4", "dave"));
    peer.send_frame(&ServerFrame::private_message("4", "dave", "1", "yo"));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PrivateMessage { .. })).await;

    let online: Vec<String> = client
        .online_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.username)
        .collect();
    assert_eq!(online, vec!["bob", "dave"]);

    let roster = vec![
        RosterEntry::new("2", "bob"),
        RosterEntry::new("3", "carol"),
        RosterEntry::new("4", "dave"),
    ];
    let view = client.friends_view(roster).await.unwrap();
    let summary: Vec<(bool, usize)> = view.iter().map(|f| (f.is_online, f.unread_count)).collect();
    assert_eq!(summary, vec![(true, 0), (false, 0), (true, 1)]);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (client, _server, peer, mut events) = connected().await;

    peer.send_text("{not json");
    peer.send_text(r#"{"content":"no type"}"#);
    peer.send_text(r#"{"type":"privateMessage","senderId":2,"content":"no receiver"}"#);
    peer.send_text(r#"{"type":"somethingNew","value":1}"#);
    peer.send_frame(&ServerFrame::error("bad request"));
    peer.send_frame(&ServerFrame::new_message("2", "bob", "still alive"));

    let event = wait_for(&mut events, |e| {
        matches!(e, ChatEvent::ServerError(_) | ChatEvent::PublicMessage(_))
    })
    .await;
    assert_eq!(event, ChatEvent::ServerError("bad request".into()));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PublicMessage(_))).await;

    assert_eq!(client.state().await.unwrap(), ConnectionState::Connected);
    assert_eq!(client.public_history().await.unwrap().len(), 1);
    assert!(client.private_history("2").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_unexpected_close() {
    let (client, mut server, peer, mut events) = connected().await;

    peer.close();
    wait_for_state(&mut events, ConnectionState::Disconnected).await;

    let peer = server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(server.attempts(), 2);

    // The counter resets on success, so a later drop gets the full budget again.
    peer.close();
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(client.state().await.unwrap(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_until_explicit_connect() {
    let (client, mut server, peer, mut events) = connected().await;

    server.refuse_all(Some(Refusal::Unreachable));
    peer.close();

    let event = wait_for(&mut events, |e| matches!(e, ChatEvent::ConnectivityFailed { .. })).await;
    assert_eq!(event, ChatEvent::ConnectivityFailed { attempts: 2 });
    assert_eq!(server.attempts(), 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 3);
    assert_eq!(client.state().await.unwrap(), ConnectionState::Disconnected);

    server.refuse_all(None);
    client.connect().await.unwrap();
    server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(server.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_reconnection() {
    let (client, server, mut peer, mut events) = connected().await;

    client.disconnect().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Disconnected).await;

    // The server side sees the close.
    assert_eq!(peer.recv_text().await, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);
    assert!(matches!(
        client.send_public("anyone?", None).await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_auth_rejection_expires_session() {
    let (client, server) = spawn(credentials("1", "alice"));
    let mut events = client.subscribe();
    server.refuse_next(Refusal::Unauthorized);

    client.connect().await.unwrap();
    wait_for(&mut events, |e| *e == ChatEvent::SessionExpired).await;

    let session = client.session().await.unwrap();
    assert!(!session.is_logged_in);
    assert_eq!(session.token, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);

    let reconciled = client.reconcile(Route::guarded()).await.unwrap();
    assert_eq!(reconciled.access, Access::RedirectToLogin);
    assert!(matches!(client.connect().await, Err(ClientError::NoToken)));
}

#[tokio::test(start_paused = true)]
async fn test_credentials_removed_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let mut store = FileCredentialStore::open(&path).unwrap();
    login(&mut store, "tok-123456789", UserProfile::new("1", "alice")).unwrap();

    let (client, mut server) = spawn(store);
    let mut events = client.subscribe();
    client.connect().await.unwrap();
    let mut peer = server.accept().await.unwrap();
    wait_for_state(&mut events, ConnectionState::Connected).await;

    // Logged out from somewhere else.
    std::fs::remove_file(&path).unwrap();

    let reconciled = client.reconcile(Route::guarded()).await.unwrap();
    assert_eq!(reconciled.directive, Directive::CommitLogout);
    assert_eq!(reconciled.access, Access::RedirectToLogin);
    wait_for_state(&mut events, ConnectionState::Disconnected).await;
    assert_eq!(peer.recv_text().await, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 1);
    assert!(!client.session().await.unwrap().is_logged_in);
    assert!(matches!(client.connect().await, Err(ClientError::NoToken)));
}

#[tokio::test]
async fn test_logout_resets_state() {
    let (client, _server, peer, mut events) = connected().await;

    peer.send_frame(&ServerFrame::private_message("2", "bob", "1", "hey"));
    wait_for(&mut events, |e| matches!(e, ChatEvent::PrivateMessage { .. })).await;

    client.logout().await.unwrap();
    wait_for(&mut events, |e| *e == ChatEvent::SessionChanged { logged_in: false }).await;

    assert_eq!(client.state().await.unwrap(), ConnectionState::Disconnected);
    assert_eq!(client.total_unread().await.unwrap(), 0);
    assert!(client.private_history("2").await.unwrap().is_empty());
    assert!(!client.session().await.unwrap().is_logged_in);
}

#[tokio::test]
async fn test_login_then_connect() {
    let (client, mut server) = spawn(MemoryCredentialStore::new());
    let mut events = client.subscribe();

    let reconciled = client.reconcile(Route::guarded()).await.unwrap();
    assert_eq!(reconciled.access, Access::RedirectToLogin);

    let session = client
        .login("fresh-token", UserProfile::new("7", "grace"))
        .await
        .unwrap();
    assert!(session.is_logged_in);
    wait_for(&mut events, |e| *e == ChatEvent::SessionChanged { logged_in: true }).await;

    client.connect().await.unwrap();
    let peer = server.accept().await.unwrap();
    assert!(peer.url().ends_with("token=fresh-token"));

    let reconciled = client.reconcile(Route::guarded()).await.unwrap();
    assert_eq!(reconciled.access, Access::Granted);
}
