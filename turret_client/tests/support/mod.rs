// Shared harness: a fake relay the client connects to, plus client settings for fast ticks.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use turret_client::ClientSettings;
use turret_client::domain::CanvasGeometry;
use turret_client::frameworks::layout::{TurretLayout, TurretSpec};
use turret_client::interface_adapters::relay_client::RelayClientSettings;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

// Stand-in for the relay; the test accepts each client connection explicitly.
pub struct FakeRelay {
    listener: TcpListener,
    pub url: Url,
}

pub struct RelayConn {
    socket: WebSocketStream<TcpStream>,
}

impl FakeRelay {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake relay");
        let addr = listener.local_addr().expect("fake relay addr");
        Self {
            listener,
            url: Url::parse(&format!("ws://{addr}/")).expect("fake relay url"),
        }
    }

    pub async fn accept(&self) -> RelayConn {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("client should connect")
            .expect("accept client");
        let socket = accept_async(stream).await.expect("client handshake");
        RelayConn { socket }
    }
}

impl RelayConn {
    // Next JSON text frame from the client, skipping control frames.
    pub async fn next_json(&mut self) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(WAIT, self.socket.next())
                .await
                .expect("client frame should arrive")
                .expect("client socket open")
                .expect("client socket healthy");
            match message {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("client sends json");
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    // Wait until the client pops `loon_id`; earlier pops of other balloons are skipped.
    pub async fn next_pop_of(&mut self, loon_id: &str) {
        loop {
            let frame = self.next_json().await;
            if frame["type"] == "pop_loon" && frame["data"] == loon_id {
                return;
            }
        }
    }

    // Assert nothing but control frames arrive for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.socket.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(other) => panic!("expected no frames, got {other:?}"),
            }
        }
    }

    pub async fn push(&mut self, frame: &str) {
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .expect("push frame to client");
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

pub fn test_settings(relay_url: Url, auto_start: bool, turrets: Vec<TurretSpec>) -> ClientSettings {
    ClientSettings {
        relay: RelayClientSettings {
            url: relay_url,
            connect_timeout: Duration::from_secs(2),
            reconnect_min: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
        },
        geometry: CanvasGeometry::default(),
        fire_interval: Duration::from_millis(20),
        round_end_sentinel: "No loons left".to_string(),
        end_game_on_round_end: false,
        auto_start,
        history_limit: 16,
        layout: TurretLayout { turrets },
    }
}

pub fn turret(left: f64, top: f64) -> TurretSpec {
    TurretSpec { left, top, level: 0 }
}

pub struct RunningClient {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

pub fn spawn_client(settings: ClientSettings) -> RunningClient {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(turret_client::run(settings, async move {
        let _ = stop_rx.await;
    }));
    RunningClient { stop_tx, task }
}

impl RunningClient {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("client should stop")
            .expect("client task should not panic")
            .expect("client run should succeed");
    }
}
