//! Concurrency-safe store of drawable entities.
//!
//! Adding and removing entities is thread-safe, and so is mutating
//! *different* entities concurrently. Mutating the *same* entity from two
//! tasks at once is a caller bug: it cannot corrupt memory, but which update
//! wins is unspecified. Operating on an entity that has been removed is
//! harmless.
//!
//! The id → entity map sits behind one mutex. Each entity has its own cell,
//! so attribute updates never hold the map lock and a snapshot never sees a
//! half-written entity.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::entity::{Entity, EntityId, Shape};

type Cell = Arc<Mutex<Entity>>;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    next_id: AtomicU64,
    entities: Mutex<BTreeMap<EntityId, Cell>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, shape: Shape, x: f64, y: f64, vx: f64, vy: f64) -> EntityId {
        let id = EntityId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entity = Entity::new(id, shape, x, y, vx, vy);
        self.entities.lock().insert(id, Arc::new(Mutex::new(entity)));
        id
    }

    pub fn add_point(&self, colour: &str, x: f64, y: f64, vx: f64, vy: f64) -> EntityId {
        let shape = Shape::Point {
            colour: colour.to_string(),
        };
        self.add(shape, x, y, vx, vy)
    }

    pub fn add_sprite(&self, file: &str, x: f64, y: f64, vx: f64, vy: f64) -> EntityId {
        let shape = Shape::Sprite {
            file: file.to_string(),
        };
        self.add(shape, x, y, vx, vy)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_line(&self, colour: &str, x1: f64, y1: f64, x2: f64, y2: f64, vx: f64, vy: f64) -> EntityId {
        let shape = Shape::Line {
            colour: colour.to_string(),
            x2,
            y2,
        };
        self.add(shape, x1, y1, vx, vy)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_text(
        &self,
        text: &str,
        font: &str,
        size: f64,
        colour: &str,
        x: f64,
        y: f64,
        vx: f64,
        vy: f64,
    ) -> EntityId {
        let shape = Shape::Text {
            colour: colour.to_string(),
            size,
            font: font.to_string(),
            text: text.to_string(),
        };
        self.add(shape, x, y, vx, vy)
    }

    /// Returns whether the entity was present. Removing twice is fine.
    pub fn remove(&self, id: EntityId) -> bool {
        self.entities.lock().remove(&id).is_some()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entities.lock().clear();
    }

    /// Mutate one entity in place. `None` if it has been removed.
    ///
    /// The map lock is only held long enough to find the cell.
    pub fn update<R>(&self, id: EntityId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let cell = self.entities.lock().get(&id).cloned()?;
        let mut entity = cell.lock();
        Some(f(&mut entity))
    }

    /// Advance an entity by its per-tick velocity.
    pub fn move_entity(&self, id: EntityId) -> bool {
        self.update(id, Entity::step).is_some()
    }

    pub fn set_position(&self, id: EntityId, x: f64, y: f64) -> bool {
        self.update(id, |e| {
            e.x = x;
            e.y = y;
        })
        .is_some()
    }

    pub fn set_velocity(&self, id: EntityId, vx: f64, vy: f64) -> bool {
        self.update(id, |e| {
            e.vx = vx;
            e.vy = vy;
        })
        .is_some()
    }

    pub fn set_hidden(&self, id: EntityId, hidden: bool) -> bool {
        self.update(id, |e| e.hidden = hidden).is_some()
    }

    /// Copy of an entity's current state, hidden or not.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.update(id, |e| e.clone())
    }

    /// Every visible entity, copied whole while the map is locked, in id order.
    pub fn snapshot(&self) -> Vec<Entity> {
        let entities = self.entities.lock();
        entities
            .values()
            .filter_map(|cell| {
                let entity = cell.lock();
                (!entity.hidden).then(|| entity.clone())
            })
            .collect()
    }
}
