#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use mailtools::{Controller, FlushReport, MailTools};
use mailtools_common::{Message, Signal};
use mailtools_qmqp::{ClientConfig, Server, ServerConfig, Status, netstring};
use mailtools_spool::{EntryState, SpoolConfig, SpoolEntryName, queue_file, spool::now};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::broadcast,
    task::JoinHandle,
};

type Received = Arc<Mutex<Vec<Message>>>;

fn basic_message() -> Message {
    Message::builder()
        .body("Subject: Testing\nFrom: <me@example.com>\nTo: <you@example.com>\n\nTest Me!")
        .return_path("me@example.com")
        .recipient(r#"you@example.com {"name":"You"}"#)
        .recipient("them@example.com")
        .build()
        .unwrap()
}

fn local_server(accept_limit: usize) -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        accept_limit: Some(accept_limit),
        ..ServerConfig::default()
    }
}

fn controller_in(dir: &TempDir, servers: Vec<String>) -> Controller {
    MailTools {
        spool: SpoolConfig::builder()
            .path(dir.path().join("maildrop"))
            .dead_letter(dir.path().join("maildrop.dead"))
            .build()
            .unwrap(),
        client: ClientConfig {
            servers,
            ..ClientConfig::default()
        },
        server: local_server(1),
    }
    .into()
}

/// A QMQP server that records what it receives.
async fn recording_server(accept_limit: usize) -> (SocketAddr, Received, JoinHandle<()>) {
    let received: Received = Arc::default();
    let sink = Arc::clone(&received);

    let server = Server::bind(&local_server(accept_limit), move |message: Message| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(message);
            Ok::<(), anyhow::Error>(())
        }
    })
    .await
    .unwrap();

    let address = server.local_addr().unwrap();
    let (_tx, rx) = broadcast::channel::<Signal>(1);
    let task = tokio::spawn(async move { server.serve(rx).await.unwrap() });

    (address, received, task)
}

/// A peer that answers every connection with `reply`, verbatim.
async fn replying_server(reply: Vec<u8>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.unwrap();
        stream.write_all(&reply).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    (address, task)
}

async fn unreachable_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    address.to_string()
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_served_messages_are_spooled() {
    let dir = TempDir::new().unwrap();
    let receiver = controller_in(&dir, Vec::new());

    let server = receiver.bind().await.unwrap();
    let address = server.local_addr().unwrap();
    let (_tx, rx) = broadcast::channel::<Signal>(1);
    let task = tokio::spawn(async move { server.serve(rx).await.unwrap() });

    let sender = controller_in(&dir, vec![address.to_string()]);
    let delivery = sender.client().deliver(&basic_message()).await;
    assert_eq!(delivery.response().unwrap().status, Status::Accepted);
    task.await.unwrap();

    let entries = receiver.spool().entries().await.unwrap();
    assert_eq!(entries.len(), 1);

    let spooled = receiver.spool().load(&entries[0]).await.unwrap();
    assert_eq!(spooled.return_path(), "me@example.com");
    assert_eq!(
        spooled.recipients().addresses().unwrap(),
        ["you@example.com", "them@example.com"]
    );
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_flush_delivers_and_empties_spool() {
    let dir = TempDir::new().unwrap();
    let (address, received, task) = recording_server(2).await;
    let controller = controller_in(&dir, vec![address.to_string()]);

    controller.enqueue(&basic_message()).await.unwrap();
    controller.enqueue(&basic_message()).await.unwrap();

    let report = controller.flush().await.unwrap();
    task.await.unwrap();

    assert_eq!(
        report,
        FlushReport {
            delivered: 2,
            failed: 0,
            malformed: 0,
        }
    );
    assert!(controller.spool().entries().await.unwrap().is_empty());

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body(), basic_message().body());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_flush_defers_when_no_server_reachable() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, vec![unreachable_server().await]);

    controller.enqueue(&basic_message()).await.unwrap();
    let report = controller.flush().await.unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 1);

    let entries = controller.spool().entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name.state(), EntryState::Deferred(1));
    assert!(!entries[0].name.is_due(now()));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_flush_defers_on_temporary_failure() {
    let dir = TempDir::new().unwrap();
    let (address, task) = replying_server(netstring::encode(b"Zdisk full")).await;
    let controller = controller_in(&dir, vec![address.to_string()]);

    controller.enqueue(&basic_message()).await.unwrap();
    let report = controller.flush().await.unwrap();
    task.await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(controller.spool().entries().await.unwrap().len(), 1);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_flush_dead_letters_malformed_entries() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, vec![unreachable_server().await]);
    controller.spool().init().await.unwrap();

    let name = SpoolEntryName::new(now(), "00001", EntryState::New);
    tokio::fs::write(controller.spool().path().join(name.to_string()), "no envelope here")
        .await
        .unwrap();

    let report = controller.flush().await.unwrap();

    assert_eq!(report.malformed, 1);
    assert!(controller.spool().entries().await.unwrap().is_empty());
    assert_eq!(controller.spool().dead_letters().await.unwrap().len(), 1);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_send_delivers_queue_file() {
    let dir = TempDir::new().unwrap();
    let (address, received, task) = recording_server(1).await;
    let controller = controller_in(&dir, vec![address.to_string()]);

    let path = dir.path().join("message.queue");
    std::fs::write(&path, queue_file::serialize(&basic_message()).unwrap()).unwrap();

    let response = controller.send(&path).await.unwrap();
    task.await.unwrap();

    assert!(response.is_accepted());
    assert_eq!(received.lock().unwrap()[0].return_path(), "me@example.com");
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_send_reports_permanent_failure() {
    let dir = TempDir::new().unwrap();
    let (address, task) = replying_server(netstring::encode(b"Dno such user")).await;
    let controller = controller_in(&dir, vec![address.to_string()]);

    let path = dir.path().join("message.queue");
    std::fs::write(&path, queue_file::serialize(&basic_message()).unwrap()).unwrap();

    let err = controller.send(&path).await.unwrap_err();
    task.await.unwrap();

    assert!(err.to_string().contains("no such user"), "{err}");
}
