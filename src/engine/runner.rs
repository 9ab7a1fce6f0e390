use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::hub::{HubHandle, HubStats, SessionHub, SessionId, SessionTarget};
use crate::config::EngineConfig;
use crate::core::{AssetCatalog, Canvas};
use crate::error::{ConfigError, HubError};
use crate::protocol::{encode_audio, encode_debug, encode_visual, Click};

/// Everything a producer needs: assets, the session hub and the frame counter.
///
/// Build one per process with [`Engine::start`] and share it behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    assets: Arc<AssetCatalog>,
    hub: HubHandle,
    /// Last counter handed out. Held while the frame is posted so counters
    /// reach the hub in order.
    frames: Mutex<u64>,
}

impl Engine {
    /// Freeze the asset catalog and spawn the session hub.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig, assets: AssetCatalog) -> Result<Self, ConfigError> {
        config.validate()?;
        let hub = SessionHub::spawn(config.single_session);
        Ok(Self {
            config,
            assets: Arc::new(assets),
            hub,
            frames: Mutex::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetCatalog {
        &self.assets
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// A fresh, empty scene.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(Arc::clone(&self.assets))
    }

    /// Broadcast the canvas as one visual frame, followed by an audio frame if
    /// any sounds were queued. Returns the visual frame's counter.
    ///
    /// The sound queue is drained whether or not anyone is listening. Safe to
    /// call from several producers at once: every session sees counters in
    /// increasing order.
    pub fn send(&self, canvas: &Canvas) -> u64 {
        let entities = canvas.entities.snapshot();
        let cues = canvas.sounds.drain_all();

        // Counter and post under one lock. `broadcast` never blocks.
        let mut frames = self.frames.lock();
        *frames += 1;
        let counter = *frames;
        let visual = encode_visual(counter, &entities, &self.assets, self.config.tick_rate);
        trace!(counter, entities = entities.len(), bytes = visual.len(), "sending visual frame");
        self.hub.broadcast(visual);
        if let Some(audio) = encode_audio(&cues) {
            self.hub.broadcast(audio);
        }
        counter
    }

    pub fn send_debug(&self, message: &str) {
        self.hub.broadcast(encode_debug(message));
    }

    pub async fn key_down(&self, target: impl Into<SessionTarget>, key: &str) -> Result<bool, HubError> {
        self.hub.key_down(target, key).await
    }

    pub async fn key_down_clear(&self, target: impl Into<SessionTarget>, key: &str) -> Result<bool, HubError> {
        self.hub.key_down_clear(target, key).await
    }

    pub async fn poll_clicks(&self, target: impl Into<SessionTarget>) -> Result<Vec<Click>, HubError> {
        self.hub.poll_clicks(target).await
    }

    pub async fn player_count(&self) -> Result<usize, HubError> {
        self.hub.count().await
    }

    pub async fn player_set(&self) -> Result<std::collections::BTreeSet<SessionId>, HubError> {
        self.hub.session_ids().await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.hub.stats().await
    }
}
