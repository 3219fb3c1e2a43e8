//! End-to-end tests: a real server on an ephemeral port, driven by the
//! crate's own client.

use snapkv::{Client, RespValue, Server, ServerConfig};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    port: u16,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<usize, snapkv::PersistenceError>>,
}

impl Running {
    async fn client(&self) -> Client {
        Client::connect("127.0.0.1", self.port).await.unwrap()
    }

    async fn shutdown(self) -> usize {
        self.stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap()
    }
}

async fn start(snapshot: &Path) -> Running {
    let config = ServerConfig {
        port: 0,
        snapshot: snapshot.to_path_buf(),
        save_interval: 0,
        ..Default::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(Server::new(config).run(listener, async {
        let _ = stopped.await;
    }));

    Running { port, stop, task }
}

fn bulk(s: &str) -> RespValue {
    RespValue::bulk_string(s.to_string())
}

#[tokio::test]
async fn test_graceful_shutdown_persists_and_restart_restores() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.snapkv");

    let server = start(&path).await;
    let mut client = server.client().await;

    assert_eq!(client.send(["SET", "name", "snap"]).await.unwrap(), RespValue::ok());
    client.send(["RPUSH", "queue", "a", "b"]).await.unwrap();
    client.send(["HSET", "user", "id", "7"]).await.unwrap();
    client.send(["SADD", "tags", "x"]).await.unwrap();
    client.send(["SET", "session", "s", "EX", "100"]).await.unwrap();
    client.send(["SET", "gone", "g", "PX", "1"]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The open connection must not hold up shutdown.
    assert_eq!(server.shutdown().await, 5);
    assert!(path.exists());

    let server = start(&path).await;
    let mut client = server.client().await;

    assert_eq!(client.send(["GET", "name"]).await.unwrap(), bulk("snap"));
    assert_eq!(
        client.send(["LRANGE", "queue", "0", "-1"]).await.unwrap(),
        RespValue::array(vec![bulk("a"), bulk("b")])
    );
    assert_eq!(client.send(["HGET", "user", "id"]).await.unwrap(), bulk("7"));
    assert_eq!(
        client.send(["SISMEMBER", "tags", "x"]).await.unwrap(),
        RespValue::integer(1)
    );
    match client.send(["TTL", "session"]).await.unwrap() {
        RespValue::Integer(ttl) => assert!((95..=100).contains(&ttl), "ttl {}", ttl),
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(client.send(["EXISTS", "gone"]).await.unwrap(), RespValue::integer(0));

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_clients_see_whole_values() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&dir.path().join("dump.snapkv")).await;

    let long_a = "a".repeat(4096);
    let long_b = "b".repeat(4096);

    let mut tasks = Vec::new();
    for writer in 0..4 {
        let mut client = server.client().await;
        let (a, b) = (long_a.clone(), long_b.clone());
        tasks.push(tokio::spawn(async move {
            for i in 0..200 {
                let value = if (i + writer) % 2 == 0 { &a } else { &b };
                let reply = client
                    .send(["SET".to_string(), "shared".to_string(), value.clone()])
                    .await
                    .unwrap();
                assert_eq!(reply, RespValue::ok());
            }
        }));
    }
    for _ in 0..4 {
        let mut client = server.client().await;
        let (a, b) = (long_a.clone(), long_b.clone());
        tasks.push(tokio::spawn(async move {
            for _ in 0..200 {
                match client.send(["GET", "shared"]).await.unwrap() {
                    RespValue::Null => {}
                    RespValue::BulkString(v) => {
                        assert!(v == a.as_bytes() || v == b.as_bytes(), "torn value");
                    }
                    other => panic!("unexpected reply {:?}", other),
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut client = server.client().await;
    for _ in 0..50 {
        client.send(["INCR", "counter"]).await.unwrap();
    }
    assert_eq!(client.send(["GET", "counter"]).await.unwrap(), bulk("50"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_errors_keep_connection_usable() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&dir.path().join("dump.snapkv")).await;
    let mut client = server.client().await;

    assert_eq!(
        client.send(["FOOBAR"]).await.unwrap(),
        RespValue::error("ERR unknown command 'FOOBAR'")
    );
    client.send(["RPUSH", "list", "a"]).await.unwrap();
    assert!(client.send(["GET", "list"]).await.unwrap().is_error());
    assert_eq!(
        client.send(["GET"]).await.unwrap(),
        RespValue::error("ERR wrong number of arguments for 'get' command")
    );
    assert_eq!(client.send(["PING"]).await.unwrap(), RespValue::pong());

    server.shutdown().await;
}

#[tokio::test]
async fn test_bgsave_and_lastsave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.snapkv");
    let server = start(&path).await;
    let mut client = server.client().await;

    assert_eq!(client.send(["LASTSAVE"]).await.unwrap(), RespValue::integer(0));
    client.send(["SET", "k", "v"]).await.unwrap();
    assert_eq!(
        client.send(["BGSAVE"]).await.unwrap(),
        RespValue::simple_string("Background saving started")
    );

    let mut saved = false;
    for _ in 0..100 {
        if let RespValue::Integer(ts) = client.send(["LASTSAVE"]).await.unwrap() {
            if ts > 0 {
                saved = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saved);
    assert!(path.exists());

    server.shutdown().await;
}

#[tokio::test]
async fn test_quit_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&dir.path().join("dump.snapkv")).await;
    let mut client = server.client().await;

    assert_eq!(client.send(["QUIT"]).await.unwrap(), RespValue::ok());
    assert!(client.send(["PING"]).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_not_blocked_by_client_that_stops_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.snapkv");
    let server = start(&path).await;

    // 64 replies of 1 MiB each overflow the socket buffers, so the server
    // ends up parked in a write to this client.
    let value = "x".repeat(1024 * 1024);
    let mut stalled = TcpStream::connect(("127.0.0.1", server.port)).await.unwrap();
    let set = RespValue::command(["SET".to_string(), "big".to_string(), value]).serialize();
    stalled.write_all(&set).await.unwrap();
    let get = RespValue::command(["GET", "big"]).serialize();
    for _ in 0..64 {
        stalled.write_all(&get).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.shutdown().await, 1);
    assert!(path.exists());
    drop(stalled);

    let server = start(&path).await;
    let mut client = server.client().await;
    assert_eq!(
        client.send(["STRLEN", "big"]).await.unwrap(),
        RespValue::integer(1024 * 1024)
    );
    server.shutdown().await;
}
