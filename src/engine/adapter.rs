//! Per-connection plumbing between a socket and the session hub.
//!
//! Each connection gets a reader task (socket → command decoder → hub) and a
//! writer task (outbound queue → socket). Whichever finishes first takes the
//! other down with it, and the session leaves the hub exactly once.

use std::fmt::Display;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::hub::{HubHandle, SessionId};
use crate::protocol::Command;

/// `Connecting → Joined → Leaving → Gone`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Connecting,
    Joined,
    Leaving,
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The viewer closed the connection.
    Peer,
    Read(String),
    Write(String),
    /// The hub dropped our outbound queue: eviction or hub shutdown.
    Evicted,
    /// One of the tasks panicked or was cancelled.
    Aborted,
}

struct Lifecycle {
    id: SessionId,
    hub: HubHandle,
    phase: SessionPhase,
}

impl Lifecycle {
    fn advance(&mut self, next: SessionPhase) {
        debug_assert!(next > self.phase, "session phase went backwards");
        debug!(session = %self.id, from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }

    fn leave(&mut self) {
        self.advance(SessionPhase::Leaving);
        self.hub.leave(self.id);
        self.advance(SessionPhase::Gone);
    }
}

impl Drop for Lifecycle {
    // Reached early only when the connection future is cancelled.
    fn drop(&mut self) {
        if self.phase == SessionPhase::Joined {
            debug!(session = %self.id, "connection cancelled");
            self.leave();
        }
    }
}

/// Aborts the task when dropped.
struct TaskGuard(JoinHandle<Disconnect>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drive one viewer connection until either side gives up.
///
/// `sink` receives encoded frames; `stream` yields inbound text messages.
/// Returns the session id that was used and why the connection ended.
pub async fn serve_connection<Si, St, E>(
    hub: HubHandle,
    outbound_capacity: usize,
    sink: Si,
    stream: St,
) -> (SessionId, Disconnect)
where
    Si: Sink<String> + Send + Unpin + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<String, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let id = hub.next_session_id();
    let mut lifecycle = Lifecycle {
        id,
        hub: hub.clone(),
        phase: SessionPhase::Connecting,
    };

    let (outbound, rx) = mpsc::channel(outbound_capacity.max(1));
    hub.join(id, outbound);
    lifecycle.advance(SessionPhase::Joined);

    // Spawned after `join` was queued, so every input event lands behind it.
    let mut writer = TaskGuard(tokio::spawn(write_loop(id, rx, sink)));
    let mut reader = TaskGuard(tokio::spawn(read_loop(id, hub.clone(), stream)));

    // Dropping either guard aborts the task, so cancelling this future stops both.
    let reason = tokio::select! {
        result = &mut writer.0 => {
            reader.0.abort();
            result.unwrap_or(Disconnect::Aborted)
        }
        result = &mut reader.0 => {
            writer.0.abort();
            result.unwrap_or(Disconnect::Aborted)
        }
    };

    lifecycle.leave();

    info!(session = %id, reason = ?reason, "connection closed");
    (id, reason)
}

async fn read_loop<St, E>(id: SessionId, hub: HubHandle, mut stream: St) -> Disconnect
where
    St: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(text) => text,
            Err(e) => return Disconnect::Read(e.to_string()),
        };

        match Command::parse(&text) {
            Ok(Command::KeyDown(key)) => hub.key_event(id, key, true),
            Ok(Command::KeyUp(key)) => hub.key_event(id, key, false),
            Ok(Command::Click(click)) => hub.click_event(id, click),
            Err(e) => debug!(session = %id, error = %e, "ignoring inbound message"),
        }
    }
    Disconnect::Peer
}

async fn write_loop<Si>(id: SessionId, mut rx: mpsc::Receiver<std::sync::Arc<str>>, mut sink: Si) -> Disconnect
where
    Si: Sink<String> + Unpin,
    Si::Error: Display,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(frame.to_string()).await {
            return Disconnect::Write(e.to_string());
        }
    }

    debug!(session = %id, "outbound queue closed");
    let _ = sink.close().await;
    Disconnect::Evicted
}
