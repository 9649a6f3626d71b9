// Shared harness: a fake upstream telemetry server plus a relay bound to an ephemeral port.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use relay_server::RelaySettings;
use relay_server::interface_adapters::net::UpstreamSettings;
use relay_server::interface_adapters::state::HeartbeatSettings;
use std::{net::SocketAddr, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async, tungstenite::Message};
use url::Url;

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

// Stand-in for the third-party telemetry service. Serves relay connections one after another,
// so a dropped connection can be followed by the relay's reconnect.
pub struct FakeUpstream {
    pub url: Url,
    // Text frames the relay sent upstream, in order, across all connections.
    pub received_rx: mpsc::UnboundedReceiver<String>,
    // Text frames to push to the relay.
    pub push_tx: mpsc::UnboundedSender<String>,
    // Closes the current relay connection.
    pub drop_tx: mpsc::UnboundedSender<()>,
}

impl FakeUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("fake upstream addr");
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
        let (drop_tx, mut drop_rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut socket) = accept_async(stream).await else {
                    continue;
                };
                loop {
                    tokio::select! {
                        incoming = socket.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text.as_str().to_string());
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        outgoing = push_rx.recv() => match outgoing {
                            Some(text) => {
                                if socket.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => return,
                        },
                        dropped = drop_rx.recv() => {
                            if dropped.is_none() {
                                return;
                            }
                            let _ = socket.close(None).await;
                            break;
                        }
                    }
                }
            }
        });

        Self {
            url: Url::parse(&format!("ws://{addr}/TESTTOKEN/ws")).expect("fake upstream url"),
            received_rx,
            push_tx,
            drop_tx,
        }
    }

    pub async fn next_frame(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, self.received_rx.recv())
            .await
            .expect("upstream frame should arrive")
            .expect("fake upstream still running");
        serde_json::from_str(&text).expect("relay sends json upstream")
    }

    pub fn drop_connection(&self) {
        self.drop_tx
            .send(())
            .expect("fake upstream still running");
    }

    pub fn push(&self, frame: &str) {
        self.push_tx
            .send(frame.to_string())
            .expect("fake upstream still running");
    }
}

pub fn test_settings(upstream_url: Url) -> RelaySettings {
    let heartbeat = HeartbeatSettings {
        interval: Duration::from_secs(30),
        idle_timeout: Duration::from_secs(90),
    };
    RelaySettings {
        upstream: UpstreamSettings {
            url: upstream_url,
            connect_timeout: Duration::from_secs(2),
            reconnect_min: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(200),
            heartbeat_interval: heartbeat.interval,
            idle_timeout: heartbeat.idle_timeout,
        },
        heartbeat,
    }
}

// Boot a relay on an ephemeral port inside the current test runtime.
pub async fn spawn_relay(upstream_url: Url) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        relay_server::run(listener, test_settings(upstream_url))
            .await
            .expect("relay failed");
    });
    addr
}

pub async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _response) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("client should connect to relay");
    socket
}

pub async fn status(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/status"))
        .await
        .expect("status request should succeed")
        .json()
        .await
        .expect("status should be json")
}

// Poll `/status` until `check` holds; attaching happens after the upgrade response.
pub async fn wait_for_status(addr: SocketAddr, check: impl Fn(&serde_json::Value) -> bool) {
    for _ in 0..100 {
        if check(&status(addr).await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("relay status never matched");
}

pub async fn next_text(socket: &mut ClientSocket) -> String {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("client frame should arrive")
            .expect("client socket open")
            .expect("client socket healthy");
        match message {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
