use std::collections::HashMap;

use glam::DVec2;

use crate::narrowphase::LineCoefs;
use crate::types::*;

/// Per-axis limit on bounce positional fixes. Horizontal fixes overshoot the
/// limit by one before pinning; vertical fixes stop exactly at it.
pub(crate) const BOUNCE_FIX_LIMIT: u8 = 3;

/// Default horizontal player speed in points/ms.
const DEFAULT_MOVE_SPEED: f64 = 0.4;

fn sign8(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// A simulated body: shared header plus variant-specific state.
///
/// Bodies are created through the world's factory methods and addressed by
/// [`BodyId`]; the broad phase stores ids only and resolves them through the
/// world's flat body table.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) position: DVec2,
    pub(crate) bounds: Aabb,
    pub(crate) user_key: Option<UserKey>,
    /// Regions currently occupied, in the y-outer/x-inner scan order used by
    /// [`crate::broadphase::regions_of`]. Empty until first registration.
    pub(crate) regions: Vec<RegionKey>,
    /// Moved-or-resized-this-tick flag; pinned true for bullets.
    pub(crate) is_updated: bool,
    pub(crate) state: BodyState,
}

#[derive(Clone, Debug)]
pub(crate) enum BodyState {
    Static { is_sensor: bool },
    Player(PlayerState),
    Bounce(BounceState),
    Bullet(BulletState),
}

#[derive(Clone, Debug)]
pub(crate) struct PlayerState {
    pub(crate) half: DVec2,
    pub(crate) move_speed: f64,
    pub(crate) jump_height: f64,
    pub(crate) gravity: f64,
    /// Time from lift-off to the top of the jump arc, in ms:
    /// `sqrt(jump_height / gravity)`.
    pub(crate) apex_time: f64,
    /// Y the current jump or fall arc is based on.
    pub(crate) ground_y: f64,
    pub(crate) force_x: f64,
    pub(crate) move_dir_y: i8,
    pub(crate) on_ground: bool,
    /// Horizontal direction committed at lift-off; reversing it mid-air costs
    /// half the air speed.
    pub(crate) jump_init_dir: i8,
    /// Elapsed ms on the jump arc, when airborne by jumping.
    pub(crate) jump_timer: Option<f64>,
    /// Elapsed ms on the fall arc, when airborne without a jump.
    pub(crate) fall_timer: Option<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct BounceState {
    pub(crate) half: DVec2,
    /// Velocity in points/ms.
    pub(crate) force: DVec2,
    pub(crate) gravity: f64,
    /// Upward (negative) rebound velocity restored on each floor contact,
    /// decaying with every fix.
    pub(crate) rebound: f64,
    pub(crate) move_dir_y: i8,
    pub(crate) fix_count_x: u8,
    pub(crate) fix_count_y: u8,
}

#[derive(Clone, Debug)]
pub(crate) struct BulletState {
    pub(crate) prev_position: DVec2,
    /// Velocity in points/ms.
    pub(crate) force: DVec2,
    pub(crate) owner: Option<BodyId>,
    /// Travel budget in points; `None` means the bullet lives until impact or
    /// escape.
    pub(crate) range: Option<f64>,
    pub(crate) travelled: f64,
    pub(crate) coefs: LineCoefs,
}

impl Body {
    pub(crate) fn new_static(id: BodyId, desc: StaticDesc) -> Self {
        debug_assert!(desc.size.x > 0.0 && desc.size.y > 0.0);
        Self {
            id,
            position: desc.position,
            bounds: Aabb::from_center_half(desc.position, desc.size * 0.5),
            user_key: desc.user_key,
            regions: Vec::new(),
            is_updated: false,
            state: BodyState::Static {
                is_sensor: desc.is_sensor,
            },
        }
    }

    pub(crate) fn new_player(id: BodyId, desc: PlayerDesc, gravity: f64) -> Self {
        debug_assert!(desc.size.x > 0.0 && desc.size.y > 0.0);
        debug_assert!(gravity > 0.0);
        let half = desc.size * 0.5;
        let jump_height = desc.jump_height.unwrap_or(desc.size.y * 1.1);
        debug_assert!(jump_height > 0.0);
        Self {
            id,
            position: desc.position,
            bounds: Aabb::from_center_half(desc.position, half),
            user_key: desc.user_key,
            regions: Vec::new(),
            is_updated: false,
            state: BodyState::Player(PlayerState {
                half,
                move_speed: desc.move_speed.unwrap_or(DEFAULT_MOVE_SPEED),
                jump_height,
                gravity,
                apex_time: (jump_height / gravity).sqrt(),
                ground_y: desc.position.y,
                force_x: 0.0,
                move_dir_y: 0,
                on_ground: false,
                jump_init_dir: 0,
                jump_timer: None,
                fall_timer: None,
            }),
        }
    }

    pub(crate) fn new_bounce(id: BodyId, desc: BounceDesc, gravity: f64) -> Self {
        debug_assert!(desc.size.x > 0.0 && desc.size.y > 0.0);
        let half = desc.size * 0.5;
        let force = desc.force / 1000.0;
        Self {
            id,
            position: desc.position,
            bounds: Aabb::from_center_half(desc.position, half),
            user_key: desc.user_key,
            regions: Vec::new(),
            is_updated: false,
            state: BodyState::Bounce(BounceState {
                half,
                force,
                gravity,
                rebound: -force.y.abs(),
                move_dir_y: sign8(force.y),
                fix_count_x: 0,
                fix_count_y: 0,
            }),
        }
    }

    pub(crate) fn new_bullet(id: BodyId, desc: BulletDesc) -> Self {
        let force = desc.force / 1000.0;
        Self {
            id,
            position: desc.position,
            bounds: Aabb::hull_of(desc.position, desc.position),
            user_key: desc.user_key,
            regions: Vec::new(),
            // Bullets move every tick; the flag stays set for their lifetime.
            is_updated: true,
            state: BodyState::Bullet(BulletState {
                prev_position: desc.position,
                force,
                owner: desc.owner,
                range: desc.range,
                travelled: 0.0,
                coefs: LineCoefs::for_ray(desc.position, force),
            }),
        }
    }

    // --- Header accessors ---------------------------------------------------

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn kind(&self) -> BodyKind {
        match self.state {
            BodyState::Static { .. } => BodyKind::Static,
            BodyState::Player(_) => BodyKind::Player,
            BodyState::Bounce(_) => BodyKind::Bounce,
            BodyState::Bullet(_) => BodyKind::Bullet,
        }
    }

    pub fn position(&self) -> DVec2 {
        self.position
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn user_key(&self) -> Option<UserKey> {
        self.user_key
    }

    /// True for a player body with established ground contact.
    pub fn is_on_ground(&self) -> bool {
        matches!(&self.state, BodyState::Player(p) if p.on_ground)
    }

    pub(crate) fn is_static(&self) -> bool {
        matches!(self.state, BodyState::Static { .. })
    }

    pub(crate) fn is_sensor(&self) -> bool {
        matches!(self.state, BodyState::Static { is_sensor: true })
    }

    pub(crate) fn bullet_owner(&self) -> Option<BodyId> {
        match &self.state {
            BodyState::Bullet(b) => b.owner,
            _ => None,
        }
    }

    pub(crate) fn move_dir_y(&self) -> i8 {
        match &self.state {
            BodyState::Player(p) => p.move_dir_y,
            BodyState::Bounce(b) => b.move_dir_y,
            _ => 0,
        }
    }

    /// Line coefficients, sweep origin, user key and budget flag for bullet
    /// hit selection.
    pub(crate) fn bullet_probe(&self) -> Option<(LineCoefs, DVec2, Option<UserKey>, bool)> {
        match &self.state {
            BodyState::Bullet(b) => {
                Some((b.coefs, b.prev_position, self.user_key, b.range.is_some()))
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_move_dir_y(&mut self, dir: i8) {
        match &mut self.state {
            BodyState::Player(p) => p.move_dir_y = dir,
            BodyState::Bounce(b) => b.move_dir_y = dir,
            _ => {}
        }
    }

    #[cfg(test)]
    pub(crate) fn bounce_probe(&self) -> (f64, u8) {
        match &self.state {
            BodyState::Bounce(b) => (b.force.y, b.fix_count_y),
            _ => panic!("not a bounce body"),
        }
    }

    /// Post-update pass: an airborne player with no active arc starts a fall
    /// from its current height.
    pub(crate) fn arm_fall_timer(&mut self) {
        if let BodyState::Player(p) = &mut self.state {
            if !p.on_ground && p.jump_timer.is_none() && p.fall_timer.is_none() {
                p.fall_timer = Some(0.0);
                p.ground_y = self.position.y;
            }
        }
    }

    /// Consume the moved-this-tick flag; bullets keep theirs set.
    pub(crate) fn take_updated(&mut self) -> bool {
        let was = self.is_updated;
        if !matches!(self.state, BodyState::Bullet(_)) {
            self.is_updated = false;
        }
        was
    }

    // --- Host inputs --------------------------------------------------------

    /// Start walking. Reversing the committed jump direction mid-air halves
    /// the applied speed and drops the commitment. Speed persists until
    /// [`Self::stop`] is called.
    pub fn walk(&mut self, dir: MoveDir) {
        debug_assert!(matches!(self.state, BodyState::Player(_)));
        if let BodyState::Player(p) = &mut self.state {
            p.force_x = p.move_speed * dir.sign();
            if !p.on_ground && dir.sign8() != p.jump_init_dir {
                p.force_x *= 0.5;
                p.jump_init_dir = 0;
            }
        }
    }

    /// Stop walking.
    pub fn stop(&mut self) {
        debug_assert!(matches!(self.state, BodyState::Player(_)));
        if let BodyState::Player(p) = &mut self.state {
            p.force_x = 0.0;
        }
    }

    /// Begin a jump arc. Ignored while airborne.
    pub fn jump(&mut self) {
        debug_assert!(matches!(self.state, BodyState::Player(_)));
        if let BodyState::Player(p) = &mut self.state {
            if !p.on_ground {
                return;
            }
            p.jump_timer = Some(0.0);
            p.ground_y = self.position.y;
            p.jump_init_dir = sign8(p.force_x);
            p.on_ground = false;
        }
    }

    /// Snap the body to a position. Bounds and region membership catch up on
    /// the next sub-step. Static geometry cannot move once created.
    pub fn set_position(&mut self, position: DVec2) {
        debug_assert!(!self.is_static());
        self.position = position;
        self.is_updated = true;
    }

    // --- Integration --------------------------------------------------------

    /// Advance this body by `delta` ms. Bodies that expire mid-flight push
    /// their id onto `removals` and leave their bounds stale.
    pub(crate) fn integrate(&mut self, delta: f64, removals: &mut Vec<BodyId>) {
        match &mut self.state {
            BodyState::Static { .. } => {}
            BodyState::Bullet(b) => {
                b.prev_position = self.position;
                self.position += b.force * delta;
                if let Some(range) = b.range {
                    b.travelled += (self.position - b.prev_position).length();
                    if b.travelled >= range {
                        removals.push(self.id);
                        return;
                    }
                }
                self.bounds = Aabb::hull_of(b.prev_position, self.position);
            }
            BodyState::Bounce(b) => {
                let mut changed = false;
                // An axis stays live through the fix limit itself; only the
                // one-past-limit horizontal count pins it completely.
                if b.fix_count_x <= BOUNCE_FIX_LIMIT && b.force.x != 0.0 {
                    self.position.x += b.force.x * delta;
                    changed = true;
                }
                if b.fix_count_y <= BOUNCE_FIX_LIMIT {
                    self.position.y += b.force.y * delta;
                    b.force.y += b.gravity * delta;
                    changed = true;
                }
                b.move_dir_y = sign8(b.force.y);
                if changed || self.is_updated {
                    self.bounds = Aabb::from_center_half(self.position, b.half);
                    self.is_updated = true;
                }
            }
            BodyState::Player(p) => {
                let mut changed = false;
                if p.force_x != 0.0 {
                    self.position.x += p.force_x * delta;
                    if p.on_ground {
                        // Dip into the floor so the next resolution pass can
                        // reassert ground contact (or fail to, over a ledge).
                        self.position.y += 1.0;
                        p.on_ground = false;
                    }
                    changed = true;
                }
                p.move_dir_y = 0;
                if let Some(t) = p.jump_timer {
                    let t = t + delta;
                    p.jump_timer = Some(t);
                    let rise = t - p.apex_time;
                    self.position.y = p.ground_y + p.gravity * rise * rise - p.jump_height;
                    p.move_dir_y = sign8(rise);
                    changed = true;
                } else if !p.on_ground {
                    if let Some(t) = p.fall_timer {
                        let t = t + delta;
                        p.fall_timer = Some(t);
                        self.position.y = p.ground_y + p.gravity * t * t;
                        p.move_dir_y = 1;
                        changed = true;
                    }
                }
                if changed || self.is_updated {
                    self.bounds = Aabb::from_center_half(self.position, p.half);
                    self.is_updated = true;
                }
            }
        }
    }

    // --- Collision response -------------------------------------------------

    /// Apply the post-resolution state change for a positional correction.
    /// The correction points from the static body toward this one, so a
    /// negative y means ground below and a positive y means ceiling above.
    pub(crate) fn apply_correction(&mut self, correction: DVec2) {
        match &mut self.state {
            BodyState::Player(p) => {
                if correction.x != 0.0 {
                    p.jump_init_dir = 0;
                }
                if correction.y < 0.0 {
                    p.on_ground = true;
                    p.jump_init_dir = 0;
                    p.jump_timer = None;
                    p.fall_timer = None;
                } else if correction.y > 0.0 {
                    p.jump_timer = None;
                    p.jump_init_dir = 0;
                }
            }
            BodyState::Bounce(b) => {
                if correction.x != 0.0 && b.fix_count_x <= BOUNCE_FIX_LIMIT {
                    if b.fix_count_x == BOUNCE_FIX_LIMIT {
                        b.force.x = 0.0;
                    } else {
                        b.force.x *= 0.5 - 0.1 * f64::from(b.fix_count_x);
                        if correction.x * b.force.x < 0.0 {
                            b.force.x = -b.force.x;
                        }
                    }
                    // Counts one past the limit here; the integrator stops
                    // using the axis at the limit itself.
                    b.fix_count_x += 1;
                }
                if correction.y < 0.0 {
                    if b.fix_count_y == BOUNCE_FIX_LIMIT {
                        b.force.y = 0.0;
                        b.move_dir_y = 0;
                    } else {
                        b.rebound *= 0.5 - 0.15 * f64::from(b.fix_count_y);
                        b.force.y = b.rebound;
                        b.fix_count_y += 1;
                    }
                } else if correction.y > 0.0 {
                    b.force.y = -b.force.y;
                }
            }
            _ => {}
        }
    }
}

/// Insertion-ordered body storage with O(1) id lookup. Iteration order is
/// creation order, stable across deferred removals.
#[derive(Default)]
pub(crate) struct BodyStore {
    list: Vec<Body>,
    index: HashMap<BodyId, usize>,
}

impl BodyStore {
    pub(crate) fn push(&mut self, body: Body) {
        self.index.insert(body.id, self.list.len());
        self.list.push(body);
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn at(&self, i: usize) -> &Body {
        &self.list[i]
    }

    pub(crate) fn at_mut(&mut self, i: usize) -> &mut Body {
        &mut self.list[i]
    }

    pub(crate) fn get(&self, id: BodyId) -> Option<&Body> {
        self.index.get(&id).map(|&i| &self.list[i])
    }

    pub(crate) fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.index.get(&id).copied().map(move |i| &mut self.list[i])
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Body> {
        self.list.iter()
    }

    /// Remove the listed ids, preserving the order of the survivors.
    pub(crate) fn remove_many(&mut self, ids: &[BodyId]) {
        self.list.retain(|b| !ids.contains(&b.id));
        self.index.clear();
        for (i, b) in self.list.iter().enumerate() {
            self.index.insert(b.id, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn player_at(y: f64) -> Body {
        Body::new_player(
            BodyId(1),
            PlayerDesc {
                position: DVec2::new(0.0, y),
                size: DVec2::new(20.0, 40.0),
                move_speed: None,
                jump_height: None,
                user_key: None,
            },
            0.001,
        )
    }

    fn grounded_player_at(y: f64) -> Body {
        let mut body = player_at(y);
        if let BodyState::Player(p) = &mut body.state {
            p.on_ground = true;
            p.ground_y = y;
        }
        body
    }

    #[test]
    fn test_jump_arc_reaches_apex_height() {
        let mut body = grounded_player_at(160.0);
        body.jump();

        let mut removals = Vec::new();
        let mut min_y = f64::INFINITY;
        for _ in 0..60 {
            body.integrate(16.0, &mut removals);
            min_y = min_y.min(body.position.y);
        }
        // Apex of the parabola is ground_y - jump_height. Sampling at 16 ms
        // won't land exactly on the apex time, so allow the sampling error.
        let jump_height = 40.0 * 1.1;
        assert!(min_y >= 160.0 - jump_height - 1e-9);
        assert!(min_y < 160.0 - jump_height + 1.0);
    }

    #[test]
    fn test_jump_dir_sign_flips_at_apex() {
        let mut body = grounded_player_at(0.0);
        body.jump();
        let apex_time = match &body.state {
            BodyState::Player(p) => p.apex_time,
            _ => unreachable!(),
        };

        let mut removals = Vec::new();
        let mut elapsed = 0.0;
        let mut saw_up = false;
        let mut saw_down = false;
        while elapsed < apex_time * 2.0 {
            body.integrate(16.0, &mut removals);
            elapsed += 16.0;
            match body.move_dir_y() {
                -1 => {
                    saw_up = true;
                    assert!(!saw_down, "rising after the apex");
                }
                1 => saw_down = true,
                _ => {}
            }
        }
        assert!(saw_up && saw_down);
    }

    #[test]
    fn test_air_reversal_halves_speed() {
        let mut body = grounded_player_at(0.0);
        body.walk(MoveDir::Right);
        body.jump();
        body.walk(MoveDir::Left);
        if let BodyState::Player(p) = &body.state {
            assert_relative_eq!(p.force_x, -0.2);
            assert_eq!(p.jump_init_dir, 0);
        }
    }

    #[test]
    fn test_same_dir_air_walk_keeps_full_speed() {
        let mut body = grounded_player_at(0.0);
        body.walk(MoveDir::Right);
        body.jump();
        body.walk(MoveDir::Right);
        if let BodyState::Player(p) = &body.state {
            assert_relative_eq!(p.force_x, 0.4);
            assert_eq!(p.jump_init_dir, 1);
        }
    }

    #[test]
    fn test_jump_ignored_while_airborne() {
        let mut body = player_at(0.0);
        body.jump();
        if let BodyState::Player(p) = &body.state {
            assert!(p.jump_timer.is_none());
        }
    }

    #[test]
    fn test_walk_on_ground_dips_and_clears_ground() {
        let mut body = grounded_player_at(100.0);
        body.walk(MoveDir::Right);
        let mut removals = Vec::new();
        body.integrate(16.0, &mut removals);
        assert_relative_eq!(body.position.x, 0.4 * 16.0);
        assert_relative_eq!(body.position.y, 101.0);
        assert!(!body.is_on_ground());
    }

    #[test]
    fn test_bullet_advances_and_sweeps_bounds() {
        let mut body = Body::new_bullet(
            BodyId(2),
            BulletDesc {
                position: DVec2::new(10.0, 5.0),
                force: DVec2::new(1000.0, -500.0),
                owner: None,
                range: None,
                user_key: None,
            },
        );
        let mut removals = Vec::new();
        body.integrate(16.0, &mut removals);
        assert_relative_eq!(body.position.x, 26.0);
        assert_relative_eq!(body.position.y, -3.0);
        assert_relative_eq!(body.bounds.min.x, 10.0);
        assert_relative_eq!(body.bounds.max.x, 26.0);
        assert_relative_eq!(body.bounds.min.y, -3.0);
        assert_relative_eq!(body.bounds.max.y, 5.0);
        assert!(removals.is_empty());
    }

    #[test]
    fn test_bullet_range_budget_expires() {
        let mut body = Body::new_bullet(
            BodyId(3),
            BulletDesc {
                position: DVec2::ZERO,
                force: DVec2::new(1000.0, 0.0),
                owner: None,
                range: Some(30.0),
                user_key: None,
            },
        );
        let mut removals = Vec::new();
        body.integrate(16.0, &mut removals);
        assert!(removals.is_empty());
        body.integrate(16.0, &mut removals);
        assert_eq!(removals, vec![BodyId(3)]);
    }

    #[test]
    fn test_bounce_rebound_decays_then_pins() {
        let mut body = Body::new_bounce(
            BodyId(4),
            BounceDesc {
                position: DVec2::ZERO,
                force: DVec2::new(0.0, -300.0),
                size: DVec2::new(20.0, 20.0),
                user_key: None,
            },
            0.001,
        );
        let floor = DVec2::new(0.0, -1.0);
        let mut magnitudes = Vec::new();
        for _ in 0..3 {
            body.apply_correction(floor);
            if let BodyState::Bounce(b) = &body.state {
                magnitudes.push(b.force.y.abs());
            }
        }
        assert!(magnitudes.windows(2).all(|w| w[1] < w[0]));

        body.apply_correction(floor);
        if let BodyState::Bounce(b) = &body.state {
            assert_eq!(b.force.y, 0.0);
            assert_eq!(b.move_dir_y, 0);
            assert_eq!(b.fix_count_y, BOUNCE_FIX_LIMIT);
        }
    }

    #[test]
    fn test_bounce_x_fix_count_overshoots_by_one() {
        let mut body = Body::new_bounce(
            BodyId(5),
            BounceDesc {
                position: DVec2::ZERO,
                force: DVec2::new(200.0, 0.0),
                size: DVec2::new(10.0, 10.0),
                user_key: None,
            },
            0.001,
        );
        for _ in 0..10 {
            body.apply_correction(DVec2::new(-1.0, 0.0));
        }
        if let BodyState::Bounce(b) = &body.state {
            assert_eq!(b.fix_count_x, BOUNCE_FIX_LIMIT + 1);
            assert_eq!(b.force.x, 0.0);
        }
    }

    #[test]
    fn test_bounce_wall_fix_opposes_correction() {
        let mut body = Body::new_bounce(
            BodyId(6),
            BounceDesc {
                position: DVec2::ZERO,
                force: DVec2::new(200.0, 0.0),
                size: DVec2::new(10.0, 10.0),
                user_key: None,
            },
            0.001,
        );
        // Wall to the right pushes the body left; the damped force must point
        // away from the wall afterwards.
        body.apply_correction(DVec2::new(-2.0, 0.0));
        if let BodyState::Bounce(b) = &body.state {
            assert!(b.force.x < 0.0);
            assert_relative_eq!(b.force.x.abs(), 0.2 * 0.5);
        }
    }

    #[test]
    fn test_store_preserves_insertion_order_across_removal() {
        let mut store = BodyStore::default();
        for i in 1..=4 {
            store.push(Body::new_bullet(
                BodyId(i),
                BulletDesc {
                    position: DVec2::ZERO,
                    force: DVec2::new(1000.0, 1000.0),
                    owner: None,
                    range: None,
                    user_key: None,
                },
            ));
        }
        store.remove_many(&[BodyId(2)]);
        let ids: Vec<u32> = store.iter().map(|b| b.id().0).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(store.get(BodyId(2)).is_none());
        assert_eq!(store.get(BodyId(4)).unwrap().id(), BodyId(4));
    }
}
