/// Drawable entities owned by an `EntityRegistry`
use std::fmt;

/// Opaque handle to an entity. Holding one never keeps the entity alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// What an entity looks like. Position and velocity live on `Entity`.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point {
        colour: String,
    },
    /// `file` is the registered sprite file name; it becomes an alias when encoded.
    Sprite {
        file: String,
    },
    /// A line from the entity position to `(x2, y2)`. Both ends move together.
    Line {
        colour: String,
        x2: f64,
        y2: f64,
    },
    Text {
        colour: String,
        size: f64,
        font: String,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub shape: Shape,
    pub x: f64,
    pub y: f64,
    /// Per-tick velocity.
    pub vx: f64,
    pub vy: f64,
    pub hidden: bool,
}

impl Entity {
    pub(crate) fn new(id: EntityId, shape: Shape, x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self {
            id,
            shape,
            x,
            y,
            vx,
            vy,
            hidden: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        self.x += self.vx;
        self.y += self.vy;
        if let Shape::Line { x2, y2, .. } = &mut self.shape {
            *x2 += self.vx;
            *y2 += self.vy;
        }
    }
}
