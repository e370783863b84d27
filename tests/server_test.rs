//! End-to-end protocol and session behavior

mod common;

use common::{start_server, Client};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::test]
async fn set_get_del_happy_path() {
    let server = start_server(|_| {}).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(client.request("SET foo bar").await, "ok");
    assert_eq!(client.request("GET foo").await, "val: bar");
    assert_eq!(client.request("DEL foo").await, "ok");
    assert_eq!(client.request("GET foo").await, "none");

    // Graceful close: the server parts with BYE.
    assert_eq!(client.close().await, b"BYE".to_vec());
}

#[tokio::test]
async fn unknown_command_keeps_session_open() {
    let server = start_server(|_| {}).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(
        client.request("UPDATE x").await,
        "parser error: unknown command type"
    );

    // The same session still works.
    assert_eq!(client.request("SET foo bar").await, "ok");
    assert_eq!(client.request("GET foo").await, "val: bar");
}

#[tokio::test]
async fn parse_errors_become_reply_bodies() {
    let server = start_server(|_| {}).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(
        client.request("SET foo").await,
        "parser error: no enough arguments for set command"
    );
    assert_eq!(
        client.request("GET").await,
        "parser error: no enough arguments for get command"
    );
    assert_eq!(
        client.request("DEL").await,
        "parser error: no enough arguments for del command"
    );
    assert_eq!(
        client.request("SET fo-o bar").await,
        "parser error: invalid argument"
    );
}

#[tokio::test]
async fn oversized_message_closes_the_session() {
    let server = start_server(|config| {
        config.network.max_message_size = 16;
    })
    .await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.request("SET padding 12345678").await;
    assert_eq!(reply, "error: message too long");

    // Nothing but the goodbye follows.
    assert_eq!(client.drain().await, b"BYE".to_vec());
}

#[tokio::test]
async fn wrong_greeting_aborts_the_session() {
    let server = start_server(|_| {}).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"EHLO").await.unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, b"BYE".to_vec(), "no HI for a bad greeting");
}

#[tokio::test]
async fn idle_session_is_closed_by_the_server() {
    let server = start_server(|config| {
        config.network.idle_timeout = Duration::from_millis(200);
    })
    .await;
    let client = Client::connect(server.addr).await;

    // Stay silent past the deadline; the server hangs up on its own.
    let parting = timeout(Duration::from_secs(5), client.drain())
        .await
        .expect("server should close the idle session");
    assert_eq!(parting, b"BYE".to_vec());
}

#[tokio::test]
async fn connection_cap_delays_the_next_client() {
    let server = start_server(|config| {
        config.network.max_connections = 1;
    })
    .await;

    let first = Client::connect(server.addr).await;

    // The second client connects (listen backlog) but its handshake
    // cannot complete while the only slot is taken.
    let mut second = TcpStream::connect(server.addr).await.unwrap();
    second.write_all(b"HELLO").await.unwrap();
    let mut reply = [0u8; 2];
    let blocked = timeout(Duration::from_millis(300), second.read_exact(&mut reply)).await;
    assert!(blocked.is_err(), "handshake finished despite full gate");

    // Freeing the slot lets the second session through.
    first.close().await;
    timeout(Duration::from_secs(5), second.read_exact(&mut reply))
        .await
        .expect("slot release should unblock the handshake")
        .unwrap();
    assert_eq!(&reply, b"HI");
}

#[tokio::test]
async fn concurrent_readers_observe_monotonic_values() {
    let server = start_server(|config| {
        config.network.max_connections = 16;
    })
    .await;

    let mut writer = Client::connect(server.addr).await;
    assert_eq!(writer.request("SET k 1").await, "ok");

    let mut readers = Vec::new();
    for _ in 0..5 {
        let addr = server.addr;
        readers.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let mut last = 0u32;
            for _ in 0..100 {
                let reply = client.request("GET k").await;
                let value = reply
                    .strip_prefix("val: ")
                    .unwrap_or_else(|| panic!("reader saw {reply:?}"));
                let n: u32 = value.parse().unwrap();
                assert!(n >= last, "value went backwards: {n} < {last}");
                last = n;
            }
        }));
    }

    for i in 2..=200u32 {
        assert_eq!(writer.request(&format!("SET k {i}")).await, "ok");
    }
    for reader in readers {
        reader.await.unwrap();
    }
}
