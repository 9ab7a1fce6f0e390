/// A scene: the entities to draw and the sounds to play on the next send
use std::sync::Arc;

use super::assets::AssetCatalog;
use super::registry::EntityRegistry;
use super::sound::SoundQueue;

#[derive(Debug)]
pub struct Canvas {
    pub entities: EntityRegistry,
    pub sounds: SoundQueue,
}

impl Canvas {
    pub fn new(assets: Arc<AssetCatalog>) -> Self {
        Self {
            entities: EntityRegistry::new(),
            sounds: SoundQueue::new(assets),
        }
    }

    /// Queue a registered sound for the next audio frame.
    pub fn play_sound(&self, file: &str) -> bool {
        self.sounds.enqueue(file)
    }
}
