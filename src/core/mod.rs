pub mod assets;
pub mod canvas;
pub mod entity;
pub mod registry;
pub mod sound;

pub use assets::AssetCatalog;
pub use canvas::Canvas;
pub use entity::{Entity, EntityId, Shape};
pub use registry::EntityRegistry;
pub use sound::{SoundQueue, SOUND_QUEUE_CAPACITY};
