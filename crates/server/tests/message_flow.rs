//! Integration test: end-to-end message delivery
//!
//! Wires the real SQLite store, auth manager, blob store, registry, and
//! delivery router together and walks the two canonical scenarios:
//! 1. Sender online, receiver offline: the message is durable and shows up
//!    in the receiver's next history fetch, with no delivery error.
//! 2. Both online: an image send reaches the receiver's connection as a
//!    message-delivered event carrying a blob URL, not the raw payload.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tokio::sync::mpsc;

use duplex_common::{SendMessageRequest, ServerEvent, UserInfo};
use server::auth::AuthManager;
use server::delivery::DeliveryRouter;
use server::media::{BlobStore, MediaStore};
use server::presence::PresenceBroadcaster;
use server::registry::{ConnectionHandle, ConnectionRegistry};
use server::store::{MessageStore, SqliteStore};

struct TestServer {
    auth: Arc<AuthManager>,
    store: Arc<dyn MessageStore>,
    media: Arc<dyn MediaStore>,
    registry: Arc<ConnectionRegistry>,
    presence: PresenceBroadcaster,
    delivery: DeliveryRouter,
    // Keeps the blob directory alive for the test's duration
    _blob_dir: TempDir,
}

async fn setup() -> anyhow::Result<TestServer> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let blob_dir = TempDir::new()?;

    let auth = Arc::new(AuthManager::new(pool.clone(), 30).await?);
    let store: Arc<dyn MessageStore> = Arc::new(SqliteStore::new(pool).await?);
    let media: Arc<dyn MediaStore> = Arc::new(BlobStore::new(blob_dir.path().to_path_buf()));
    let registry = Arc::new(ConnectionRegistry::new());
    let presence = PresenceBroadcaster::new(registry.clone());
    let delivery = DeliveryRouter::new(store.clone(), media.clone(), registry.clone());

    Ok(TestServer {
        auth,
        store,
        media,
        registry,
        presence,
        delivery,
        _blob_dir: blob_dir,
    })
}

async fn create_users(server: &TestServer) -> anyhow::Result<(UserInfo, UserInfo)> {
    let x = server
        .auth
        .signup("x@test.com", "userx", "password123")
        .await?;
    let y = server
        .auth
        .signup("y@test.com", "usery", "password123")
        .await?;
    Ok((x, y))
}

#[tokio::test]
async fn offline_receiver_message_is_durable_and_fetchable() -> anyhow::Result<()> {
    let server = setup().await?;
    let (x, y) = create_users(&server).await?;

    // X is online, Y is not
    let (x_tx, mut x_rx) = mpsc::unbounded_channel();
    server.registry.register(&x.id, ConnectionHandle::new(x_tx));
    server.presence.broadcast();
    assert!(matches!(
        x_rx.recv().await.unwrap(),
        ServerEvent::PresenceUpdate { .. }
    ));

    let sent = server
        .delivery
        .deliver(
            &x.id,
            &y.id,
            SendMessageRequest {
                text: Some("hi".to_string()),
                image: None,
            },
        )
        .await
        .expect("offline receiver must not fail the send");

    assert_eq!(sent.sender_id, x.id);
    assert_eq!(sent.receiver_id, y.id);
    assert_eq!(sent.text.as_deref(), Some("hi"));

    // No event fired anywhere for the offline receiver; X only ever saw
    // the presence update.
    assert!(x_rx.try_recv().is_err());

    // When Y later fetches the conversation, the record is there.
    let history = server.store.history(&y.id, &x.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);

    Ok(())
}

#[tokio::test]
async fn image_send_to_online_receiver_delivers_blob_url() -> anyhow::Result<()> {
    let server = setup().await?;
    let (x, y) = create_users(&server).await?;

    let (x_tx, _x_rx) = mpsc::unbounded_channel();
    let (y_tx, mut y_rx) = mpsc::unbounded_channel();
    server.registry.register(&x.id, ConnectionHandle::new(x_tx));
    server.registry.register(&y.id, ConnectionHandle::new(y_tx));

    let sent = server
        .delivery
        .deliver(
            &x.id,
            &y.id,
            SendMessageRequest {
                text: None,
                // "image bytes"
                image: Some("data:image/png;base64,aW1hZ2UgYnl0ZXM=".to_string()),
            },
        )
        .await?;

    let image_url = sent.image_url.as_deref().expect("image url substituted");
    assert!(image_url.starts_with("/blobs/"));

    // Y's live connection gets exactly one message-delivered event with
    // the URL, never the raw base64 payload.
    match y_rx.recv().await.unwrap() {
        ServerEvent::MessageDelivered { message } => {
            assert_eq!(message.id, sent.id);
            assert_eq!(message.image_url.as_deref(), Some(image_url));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(y_rx.try_recv().is_err());

    // The URL resolves to the stored bytes
    let hash = image_url.strip_prefix("/blobs/").unwrap();
    let (data, content_type) = server.media.get(hash).await?.expect("blob stored");
    assert_eq!(data, b"image bytes");
    assert_eq!(content_type, "image/png");

    Ok(())
}

#[tokio::test]
async fn presence_tracks_connect_and_disconnect() -> anyhow::Result<()> {
    let server = setup().await?;
    let (x, y) = create_users(&server).await?;

    let (x_tx, mut x_rx) = mpsc::unbounded_channel();
    server.registry.register(&x.id, ConnectionHandle::new(x_tx));
    server.presence.broadcast();

    let (y_tx, _y_rx) = mpsc::unbounded_channel();
    let y_handle = ConnectionHandle::new(y_tx);
    let y_conn = y_handle.id;
    server.registry.register(&y.id, y_handle);
    server.presence.broadcast();

    // X saw two updates: first just itself, then both users
    match x_rx.recv().await.unwrap() {
        ServerEvent::PresenceUpdate { online } => assert_eq!(online, vec![x.id.clone()]),
        other => panic!("unexpected event: {other:?}"),
    }
    match x_rx.recv().await.unwrap() {
        ServerEvent::PresenceUpdate { mut online } => {
            online.sort();
            let mut expected = vec![x.id.clone(), y.id.clone()];
            expected.sort();
            assert_eq!(online, expected);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Y disconnects: X's view shrinks back to itself
    assert!(server.registry.unregister(&y.id, y_conn));
    server.presence.broadcast();
    match x_rx.recv().await.unwrap() {
        ServerEvent::PresenceUpdate { online } => assert_eq!(online, vec![x.id.clone()]),
        other => panic!("unexpected event: {other:?}"),
    }

    Ok(())
}
