//! The session hub: sole owner of every connected viewer's state.
//!
//! One task consumes one request queue, strictly in order, so session data
//! needs no lock. Everything else talks to it through a cloneable
//! [`HubHandle`]. Fire-and-forget requests (join, leave, input, broadcast)
//! return immediately; queries wait for the hub's reply.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::error::HubError;
use crate::protocol::Click;

/// Connection identity, assigned once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Which session a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTarget {
    /// Whichever session joined most recently, even if it has since left.
    Latest,
    Id(SessionId),
}

impl From<SessionId> for SessionTarget {
    fn from(id: SessionId) -> Self {
        SessionTarget::Id(id)
    }
}

/// Per-session outbound queue. Frames are shared between sessions.
pub type Outbound = mpsc::Sender<Arc<str>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    /// Frames lost to a full outbound queue. Sessions that are closing do not count.
    pub frames_dropped: u64,
}

enum HubRequest {
    Join {
        id: SessionId,
        outbound: Outbound,
    },
    Leave(SessionId),
    Key {
        id: SessionId,
        key: String,
        pressed: bool,
    },
    KeyQuery {
        target: SessionTarget,
        key: String,
        clear: bool,
        reply: oneshot::Sender<bool>,
    },
    Click {
        id: SessionId,
        click: Click,
    },
    PollClicks {
        target: SessionTarget,
        reply: oneshot::Sender<Vec<Click>>,
    },
    Broadcast(Arc<str>),
    SendTo {
        id: SessionId,
        frame: Arc<str>,
    },
    Count(oneshot::Sender<usize>),
    Set(oneshot::Sender<BTreeSet<SessionId>>),
    Stats(oneshot::Sender<HubStats>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Queued,
    /// Queue saturated. Only these count towards `frames_dropped`.
    Dropped,
    /// The connection is already going away.
    Closed,
}

struct Session {
    outbound: Outbound,
    keyboard: HashMap<String, bool>,
    clicks: Vec<Click>,
    dropped: u64,
}

impl Session {
    fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            keyboard: HashMap::new(),
            clicks: Vec::new(),
            dropped: 0,
        }
    }

    /// Never waits: a full queue loses this frame, a closed one is about to leave.
    fn offer(&mut self, id: SessionId, frame: Arc<str>) -> Offer {
        match self.outbound.try_send(frame) {
            Ok(()) => Offer::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(session = %id, dropped = self.dropped, "outbound queue full, dropping frame");
                Offer::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(session = %id, "outbound queue closed");
                Offer::Closed
            }
        }
    }
}

pub struct SessionHub {
    requests: mpsc::UnboundedReceiver<HubRequest>,
    sessions: HashMap<SessionId, Session>,
    latest: Option<SessionId>,
    single_session: bool,
    frames_dropped: u64,
}

impl SessionHub {
    /// Start the hub task on the current tokio runtime.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(single_session: bool) -> HubHandle {
        let (tx, requests) = mpsc::unbounded_channel();
        let hub = SessionHub {
            requests,
            sessions: HashMap::new(),
            latest: None,
            single_session,
            frames_dropped: 0,
        };
        tokio::spawn(hub.run());

        HubHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            self.handle(request);
        }
        debug!("session hub stopped");
    }

    fn handle(&mut self, request: HubRequest) {
        match request {
            HubRequest::Join { id, outbound } => self.join(id, outbound),
            HubRequest::Leave(id) => {
                if self.sessions.remove(&id).is_some() {
                    info!(session = %id, "session left");
                }
            }
            HubRequest::Key { id, key, pressed } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.keyboard.insert(key, pressed);
                }
            }
            HubRequest::KeyQuery {
                target,
                key,
                clear,
                reply,
            } => {
                let down = self
                    .resolve(target)
                    .and_then(|id| self.sessions.get_mut(&id))
                    .map(|session| {
                        let down = session.keyboard.get(&key).copied().unwrap_or(false);
                        if clear && down {
                            session.keyboard.insert(key, false);
                        }
                        down
                    })
                    .unwrap_or(false);
                let _ = reply.send(down);
            }
            HubRequest::Click { id, click } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.clicks.push(click);
                }
            }
            HubRequest::PollClicks { target, reply } => {
                let clicks = self
                    .resolve(target)
                    .and_then(|id| self.sessions.get_mut(&id))
                    .map(|session| std::mem::take(&mut session.clicks))
                    .unwrap_or_default();
                let _ = reply.send(clicks);
            }
            HubRequest::Broadcast(frame) => {
                for (id, session) in self.sessions.iter_mut() {
                    if session.offer(*id, Arc::clone(&frame)) == Offer::Dropped {
                        self.frames_dropped += 1;
                    }
                }
            }
            HubRequest::SendTo { id, frame } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    if session.offer(id, frame) == Offer::Dropped {
                        self.frames_dropped += 1;
                    }
                }
            }
            HubRequest::Count(reply) => {
                let _ = reply.send(self.sessions.len());
            }
            HubRequest::Set(reply) => {
                let _ = reply.send(self.sessions.keys().copied().collect());
            }
            HubRequest::Stats(reply) => {
                let _ = reply.send(HubStats {
                    sessions: self.sessions.len(),
                    frames_dropped: self.frames_dropped,
                });
            }
        }
    }

    fn join(&mut self, id: SessionId, outbound: Outbound) {
        if self.single_session {
            // Dropping the evicted session's sender closes its outbound queue,
            // which ends that connection's writer.
            if let Some(previous) = self.latest {
                if self.sessions.remove(&previous).is_some() {
                    info!(session = %previous, replaced_by = %id, "evicting session");
                }
            }
        }

        self.sessions.insert(id, Session::new(outbound));
        self.latest = Some(id);
        info!(session = %id, sessions = self.sessions.len(), "session joined");
    }

    fn resolve(&self, target: SessionTarget) -> Option<SessionId> {
        match target {
            SessionTarget::Latest => self.latest,
            SessionTarget::Id(id) => Some(id),
        }
    }
}

/// Cloneable front door to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubRequest>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Allocate a fresh session id.
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn join(&self, id: SessionId, outbound: Outbound) {
        self.post(HubRequest::Join { id, outbound });
    }

    /// Safe to call more than once for the same session.
    pub fn leave(&self, id: SessionId) {
        self.post(HubRequest::Leave(id));
    }

    pub fn key_event(&self, id: SessionId, key: impl Into<String>, pressed: bool) {
        self.post(HubRequest::Key {
            id,
            key: key.into(),
            pressed,
        });
    }

    pub fn click_event(&self, id: SessionId, click: Click) {
        self.post(HubRequest::Click { id, click });
    }

    /// Queue a frame for every live session without waiting on any of them.
    pub fn broadcast(&self, frame: impl Into<Arc<str>>) {
        self.post(HubRequest::Broadcast(frame.into()));
    }

    pub fn send_to(&self, id: SessionId, frame: impl Into<Arc<str>>) {
        self.post(HubRequest::SendTo {
            id,
            frame: frame.into(),
        });
    }

    /// Whether `key` is held. Unknown sessions and keys are `false`.
    pub async fn key_down(&self, target: impl Into<SessionTarget>, key: &str) -> Result<bool, HubError> {
        self.key_query(target.into(), key, false).await
    }

    /// Like [`key_down`](Self::key_down), then marks the key released.
    pub async fn key_down_clear(&self, target: impl Into<SessionTarget>, key: &str) -> Result<bool, HubError> {
        self.key_query(target.into(), key, true).await
    }

    async fn key_query(&self, target: SessionTarget, key: &str, clear: bool) -> Result<bool, HubError> {
        self.request(|reply| HubRequest::KeyQuery {
            target,
            key: key.to_string(),
            clear,
            reply,
        })
        .await
    }

    /// Every click since the previous poll.
    pub async fn poll_clicks(&self, target: impl Into<SessionTarget>) -> Result<Vec<Click>, HubError> {
        let target = target.into();
        self.request(|reply| HubRequest::PollClicks { target, reply }).await
    }

    pub async fn count(&self) -> Result<usize, HubError> {
        self.request(HubRequest::Count).await
    }

    pub async fn session_ids(&self) -> Result<BTreeSet<SessionId>, HubError> {
        self.request(HubRequest::Set).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(HubRequest::Stats).await
    }

    fn post(&self, request: HubRequest) {
        if self.tx.send(request).is_err() {
            trace!("session hub is gone, request dropped");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HubRequest) -> Result<T, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outbound(capacity: usize) -> (Outbound, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(capacity)
    }

    #[tokio::test]
    async fn join_and_leave() {
        let hub = SessionHub::spawn(false);
        let a = hub.next_session_id();
        let b = hub.next_session_id();
        assert_ne!(a, b);

        let (tx_a, _rx_a) = outbound(4);
        let (tx_b, _rx_b) = outbound(4);
        hub.join(a, tx_a);
        hub.join(b, tx_b);
        assert_eq!(hub.count().await.unwrap(), 2);
        assert_eq!(hub.session_ids().await.unwrap(), BTreeSet::from([a, b]));

        hub.leave(a);
        hub.leave(a);
        assert_eq!(hub.count().await.unwrap(), 1);
        assert_eq!(hub.session_ids().await.unwrap(), BTreeSet::from([b]));
    }

    #[tokio::test]
    async fn keyboard_state() {
        let hub = SessionHub::spawn(false);
        let id = hub.next_session_id();
        let (tx, _rx) = outbound(4);
        hub.join(id, tx);

        hub.key_event(id, "ArrowUp", true);
        assert!(hub.key_down(id, "ArrowUp").await.unwrap());
        assert!(!hub.key_down(id, "ArrowDown").await.unwrap());

        hub.key_event(id, "ArrowUp", false);
        assert!(!hub.key_down(id, "ArrowUp").await.unwrap());

        let stranger = hub.next_session_id();
        hub.key_event(stranger, "x", true);
        assert!(!hub.key_down(stranger, "x").await.unwrap());
    }

    #[tokio::test]
    async fn latest_resolves_to_most_recent_join() {
        let hub = SessionHub::spawn(false);
        assert!(!hub.key_down(SessionTarget::Latest, "a").await.unwrap());

        let first = hub.next_session_id();
        let second = hub.next_session_id();
        let (tx1, _rx1) = outbound(4);
        let (tx2, _rx2) = outbound(4);
        hub.join(first, tx1);
        hub.join(second, tx2);

        hub.key_event(first, "a", true);
        hub.key_event(second, "b", true);
        assert!(!hub.key_down(SessionTarget::Latest, "a").await.unwrap());
        assert!(hub.key_down(SessionTarget::Latest, "b").await.unwrap());
    }

    #[tokio::test]
    async fn key_down_clear_releases() {
        let hub = SessionHub::spawn(false);
        let id = hub.next_session_id();
        let (tx, _rx) = outbound(4);
        hub.join(id, tx);

        hub.key_event(id, "space", true);
        assert!(hub.key_down_clear(id, "space").await.unwrap());
        assert!(!hub.key_down(id, "space").await.unwrap());
    }

    #[tokio::test]
    async fn poll_clicks_drains() {
        let hub = SessionHub::spawn(false);
        let id = hub.next_session_id();
        let (tx, _rx) = outbound(4);
        hub.join(id, tx);

        let first = Click { button: 0, x: 10, y: 20 };
        let second = Click { button: 2, x: 30, y: 40 };
        hub.click_event(id, first);
        hub.click_event(id, second);

        assert_eq!(hub.poll_clicks(id).await.unwrap(), vec![first, second]);
        assert!(hub.poll_clicks(id).await.unwrap().is_empty());
        assert!(hub.poll_clicks(SessionTarget::Latest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_session_evicts_previous() {
        let hub = SessionHub::spawn(true);
        let a = hub.next_session_id();
        let b = hub.next_session_id();
        let (tx_a, mut rx_a) = outbound(4);
        let (tx_b, _rx_b) = outbound(4);

        hub.join(a, tx_a);
        hub.key_event(a, "w", true);
        assert!(hub.key_down(a, "w").await.unwrap());

        hub.join(b, tx_b);
        assert_eq!(hub.session_ids().await.unwrap(), BTreeSet::from([b]));
        assert!(!hub.key_down(a, "w").await.unwrap());

        // A's outbound queue was closed by the eviction.
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn saturated_session_does_not_block_others() {
        let hub = SessionHub::spawn(false);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = hub.next_session_id();
            let (tx, rx) = outbound(4);
            hub.join(id, tx);
            receivers.push(rx);
        }
        let stalled = hub.next_session_id();
        let (stalled_tx, mut stalled_rx) = outbound(1);
        stalled_tx.try_send(Arc::from("old")).unwrap();
        hub.join(stalled, stalled_tx);

        hub.broadcast("frame");
        let stats = tokio::time::timeout(Duration::from_secs(1), hub.stats())
            .await
            .expect("hub blocked on a full queue")
            .unwrap();
        assert_eq!(stats.sessions, 4);
        assert_eq!(stats.frames_dropped, 1);

        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap().as_ref(), "frame");
        }
        assert_eq!(stalled_rx.try_recv().unwrap().as_ref(), "old");
        assert!(stalled_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closing_session_is_not_counted_as_dropped() {
        let hub = SessionHub::spawn(false);
        let id = hub.next_session_id();
        let (tx, rx) = outbound(4);
        hub.join(id, tx);
        drop(rx);

        hub.broadcast("frame");
        hub.send_to(id, "direct");
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[tokio::test]
    async fn broadcast_to_nobody_is_fine() {
        let hub = SessionHub::spawn(false);
        hub.broadcast("frame");
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn send_to_targets_one_session() {
        let hub = SessionHub::spawn(false);
        let a = hub.next_session_id();
        let b = hub.next_session_id();
        let (tx_a, mut rx_a) = outbound(4);
        let (tx_b, mut rx_b) = outbound(4);
        hub.join(a, tx_a);
        hub.join(b, tx_b);

        hub.send_to(b, "only b");
        hub.count().await.unwrap();
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().as_ref(), "only b");
    }
}
