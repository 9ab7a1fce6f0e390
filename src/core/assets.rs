/// Sprite and sound registrations, resolved to short aliases for the wire
use std::collections::HashMap;

/// File name → alias lookup built before the engine starts.
///
/// Registration takes `&mut self`; `Engine::start` moves the catalog behind an
/// `Arc`, so nothing can register assets once frames are going out.
#[derive(Debug, Default, Clone)]
pub struct AssetCatalog {
    sprites: HashMap<String, String>,
    sounds: HashMap<String, String>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sprite and returns its alias. Re-registering keeps the old alias.
    pub fn register_sprite(&mut self, file: impl Into<String>) -> &str {
        let next = format!("sprite{}", self.sprites.len());
        self.sprites.entry(file.into()).or_insert(next)
    }

    pub fn register_sound(&mut self, file: impl Into<String>) -> &str {
        let next = format!("sound{}", self.sounds.len());
        self.sounds.entry(file.into()).or_insert(next)
    }

    pub fn sprite_alias(&self, file: &str) -> Option<&str> {
        self.sprites.get(file).map(String::as_str)
    }

    pub fn sound_alias(&self, file: &str) -> Option<&str> {
        self.sounds.get(file).map(String::as_str)
    }

    /// (file, alias) pairs, for whoever builds the viewer page.
    pub fn sprites(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sprites.iter().map(|(f, a)| (f.as_str(), a.as_str()))
    }

    pub fn sounds(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sounds.iter().map(|(f, a)| (f.as_str(), a.as_str()))
    }
}
