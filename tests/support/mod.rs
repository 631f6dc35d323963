//! Scripted fake RIO controller for integration tests
//!
//! The device accepts any number of connections. Each command it receives is
//! logged and passed to a handler that returns the lines to send back.
//! Tests can also push unsolicited lines to every open connection.

#![allow(dead_code)]

use russound_rio::{ClientConfig, RussoundClient};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

pub const TIMEOUT: Duration = Duration::from_secs(5);

const HANGUP: &str = "\u{0}hangup";

type Handler = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

pub struct FakeDevice {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    push: broadcast::Sender<String>,
    /// Connections accepted and listening for pushes
    accepted: Arc<watch::Sender<usize>>,
}

impl FakeDevice {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (push, _) = broadcast::channel(64);
        let accepted = Arc::new(watch::channel(0).0);
        let handler: Handler = Arc::new(handler);

        let log = received.clone();
        let pushes = push.clone();
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                let mut push_rx = pushes.subscribe();
                counter.send_modify(|n| *n += 1);

                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    let mut buf = Vec::new();
                    loop {
                        tokio::select! {
                            n = reader.read_until(b'\r', &mut buf) => {
                                if !matches!(n, Ok(n) if n > 0) {
                                    break;
                                }
                                let command = String::from_utf8_lossy(&buf)
                                    .trim_end_matches('\r')
                                    .to_string();
                                buf.clear();
                                log.lock().unwrap().push(command.clone());
                                for line in handler(&command) {
                                    if write.write_all(format!("{}\r\n", line).as_bytes()).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            line = push_rx.recv() => {
                                match line {
                                    Ok(line) if line == HANGUP => return,
                                    Ok(line) => {
                                        if write.write_all(format!("{}\r\n", line).as_bytes()).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(_) => return,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            received,
            push,
            accepted,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.ip().to_string())
            .with_port(self.addr.port())
            .with_connect_timeout(TIMEOUT)
            .with_response_timeout(TIMEOUT)
    }

    /// A client connected to this device
    ///
    /// Returns once the device side has accepted the connection, so pushes
    /// and hangups reach it.
    pub async fn client(&self) -> RussoundClient {
        self.client_with(self.config()).await
    }

    pub async fn client_with(&self, config: ClientConfig) -> RussoundClient {
        let client = RussoundClient::new(config);
        self.connect(&client).await;
        client
    }

    /// Connect `client` and wait for the device to accept it
    pub async fn connect(&self, client: &RussoundClient) {
        let target = *self.accepted.borrow() + 1;
        client.connect().await.unwrap();
        let mut accepted = self.accepted.subscribe();
        tokio::time::timeout(TIMEOUT, accepted.wait_for(|n| *n >= target))
            .await
            .expect("device never accepted the connection")
            .unwrap();
    }

    /// Send a line to every open connection
    pub fn push(&self, line: &str) {
        self.push
            .send(line.to_string())
            .expect("no connection is listening for pushes");
    }

    /// Drop every open connection
    pub fn hangup(&self) {
        self.push
            .send(HANGUP.to_string())
            .expect("no connection to hang up");
    }

    /// Commands received so far, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// A device that accepts every command with a bare `S`
pub fn accept_all(_command: &str) -> Vec<String> {
    vec!["S".to_string()]
}
