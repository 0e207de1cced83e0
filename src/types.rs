use glam::DVec2;
use serde::{Deserialize, Serialize};

/// User-defined opaque key echoed in sensor events (e.g., pack your entity id).
pub type UserKey = u64;

/// One cell of the sparse, unbounded 512x512 region grid.
pub type RegionKey = (i32, i32);

/// Stable per-world body handle. Ids are assigned monotonically starting at 1
/// and are never reused within a world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// Body variant tag. Stage dispatch (integration, collision response) is on
/// this tag rather than a virtual hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Static,
    Player,
    Bounce,
    Bullet,
}

/// Axis-aligned bounding box. `+Y` points down throughout the engine.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    /// Unbounded on both axes; the default world volume.
    pub const INFINITE: Self = Self {
        min: DVec2::NEG_INFINITY,
        max: DVec2::INFINITY,
    };

    pub fn from_center_half(center: DVec2, half: DVec2) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Hull of two points; the swept-segment box used for bullets.
    pub fn hull_of(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Inclusive containment; a body is out of the world when its position
    /// fails this test.
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::INFINITE
    }
}

/// Horizontal input direction for player bodies. A zero direction is not
/// representable; call [`crate::body::Body::stop`] to halt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDir {
    Left,
    Right,
}

impl MoveDir {
    pub(crate) fn sign(self) -> f64 {
        match self {
            MoveDir::Left => -1.0,
            MoveDir::Right => 1.0,
        }
    }

    pub(crate) fn sign8(self) -> i8 {
        match self {
            MoveDir::Left => -1,
            MoveDir::Right => 1,
        }
    }
}

/// World-level configuration.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct WorldConfig {
    /// World volume; bodies whose position leaves it are reported and removed.
    pub bounds: Aabb,
    /// Gravity in points/ms^2, injected into player and bounce bodies.
    pub gravity: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounds: Aabb::INFINITE,
            gravity: 0.001,
        }
    }
}

/// Static geometry descriptor. Bounds are fixed at creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaticDesc {
    pub position: DVec2,
    pub size: DVec2,
    /// Sensors report overlaps instead of resolving them.
    pub is_sensor: bool,
    pub user_key: Option<UserKey>,
}

/// Player body descriptor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerDesc {
    pub position: DVec2,
    pub size: DVec2,
    /// Horizontal speed in points/ms. Defaults to 0.4.
    pub move_speed: Option<f64>,
    /// Apex height of the jump arc in points. Defaults to `size.y * 1.1`.
    pub jump_height: Option<f64>,
    pub user_key: Option<UserKey>,
}

/// Bounce body descriptor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BounceDesc {
    pub position: DVec2,
    /// Launch velocity in points/second.
    pub force: DVec2,
    pub size: DVec2,
    pub user_key: Option<UserKey>,
}

/// Bullet descriptor. Bullets are swept points; their box is the hull of the
/// segment travelled each sub-step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulletDesc {
    pub position: DVec2,
    /// Velocity in points/second.
    pub force: DVec2,
    /// Body that fired the bullet; pairs against it are never generated.
    pub owner: Option<BodyId>,
    /// Total travel budget in points. Budgeted bullets expire on their own
    /// and survive non-static impacts.
    pub range: Option<f64>,
    pub user_key: Option<UserKey>,
}

/// High-level event reported back to the host from [`crate::world::World::update`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SensorEvent {
    /// The body's position left the world volume and it was scheduled for
    /// removal.
    Escaped {
        body: BodyId,
        key: Option<UserKey>,
    },
    /// A sensor and another body overlap this sub-step. Emitted every
    /// sub-step for as long as the overlap persists.
    Overlap {
        a: BodyId,
        b: BodyId,
        a_key: Option<UserKey>,
        b_key: Option<UserKey>,
    },
    /// A bullet's path crossed an eligible body; `point` is the nearest edge
    /// crossing on the target's box.
    BulletHit {
        bullet: BodyId,
        target: BodyId,
        point: DVec2,
        bullet_key: Option<UserKey>,
        target_key: Option<UserKey>,
    },
}

/// Debug/performance statistics for the broad phase.
#[derive(Copy, Clone, Debug, Default)]
pub struct BroadPhaseStats {
    /// Occupied regions.
    pub regions: usize,
    /// Sum of per-region occupancy (a body spanning N regions counts N times).
    pub entries: usize,
    /// Live candidate pairs.
    pub pairs: usize,
}
