/// Bounded queue of sound cues waiting for the next audio frame
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::assets::AssetCatalog;

pub const SOUND_QUEUE_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct SoundQueue {
    assets: Arc<AssetCatalog>,
    pending: Mutex<Vec<String>>,
}

impl SoundQueue {
    pub fn new(assets: Arc<AssetCatalog>) -> Self {
        Self {
            assets,
            pending: Mutex::new(Vec::with_capacity(SOUND_QUEUE_CAPACITY)),
        }
    }

    /// Queue a registered sound. Returns `false` if it was dropped because the
    /// queue is full or the file was never registered.
    pub fn enqueue(&self, file: &str) -> bool {
        let Some(alias) = self.assets.sound_alias(file) else {
            trace!(file, "dropping unregistered sound");
            return false;
        };

        let mut pending = self.pending.lock();
        if pending.len() >= SOUND_QUEUE_CAPACITY {
            trace!(file, "sound queue full, dropping cue");
            return false;
        }
        pending.push(alias.to_string());
        true
    }

    /// Take every queued cue, leaving the queue empty.
    pub fn drain_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
