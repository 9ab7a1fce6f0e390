//! WebSocket listener: accepts viewers and hands each one to the connection adapter.

use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tracing::{info, warn};

use crate::engine::{serve_connection, Engine};
use crate::error::ServerError;

pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
}

impl Server {
    pub async fn bind(engine: Arc<Engine>) -> Result<Self, ServerError> {
        let addr = engine.config().bind_addr.clone();
        match TcpListener::bind(&addr).await {
            Ok(listener) => Ok(Self { listener, engine }),
            Err(source) => Err(ServerError::Bind { addr, source }),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.listener.local_addr()?, "listening for viewers");

        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!(%addr, "connection opened");
            tokio::spawn(handle_connection(stream, addr, Arc::clone(&self.engine)));
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, engine: Arc<Engine>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (ws_sender, ws_receiver) = ws_stream.split();

    let sink = ws_sender.with(|text: String| future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(text))));

    // Only text frames carry commands; a close frame ends the session.
    let inbound = ws_receiver
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
        .boxed();

    let capacity = engine.config().outbound_capacity;
    let (session, reason) = serve_connection(engine.hub().clone(), capacity, Box::pin(sink), inbound).await;
    info!(%addr, %session, ?reason, "connection finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::AssetCatalog;
    use crate::protocol::{decode_frame, Frame};
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn viewer_receives_frames_and_sends_keys() {
        let config = EngineConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..Default::default()
        };
        let engine = Arc::new(Engine::start(config, AssetCatalog::new()).unwrap());
        let server = Server::bind(Arc::clone(&engine)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        while engine.player_count().await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        ws.send(Message::Text("keydown space".into())).await.unwrap();
        let mut held = false;
        for _ in 0..200 {
            if engine.key_down(crate::engine::SessionTarget::Latest, "space").await.unwrap() {
                held = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(held);

        let canvas = engine.canvas();
        canvas.entities.add_point("#0f0", 1.0, 1.0, 0.0, 0.0);
        let counter = engine.send(&canvas);

        let msg = ws.next().await.unwrap().unwrap();
        let text = msg.into_text().unwrap();
        match decode_frame(&text).unwrap() {
            Frame::Visual { counter: got, records } => {
                assert_eq!(got, counter);
                assert_eq!(records.len(), 1);
            }
            other => panic!("unexpected frame {other:?}"),
        }

        ws.close(None).await.unwrap();
        for _ in 0..200 {
            if engine.player_count().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session was not removed after close");
    }
}
