use glam::DVec2;
use tracing::{debug, trace};

use crate::body::{Body, BodyStore};
use crate::broadphase::BroadPhase;
use crate::narrowphase;
use crate::types::*;

/// Upper bound on a single integration step. Larger host deltas are split
/// into sub-steps of at most this size (a 100 ms delta runs 33, 33, 33, 1).
pub const MAX_STEP_MS: f64 = 33.0;

/// A contact picked up during detection, resolved in the following stage.
struct Contact {
    a: BodyId,
    b: BodyId,
    overlap: DVec2,
}

/// The simulation world: a flat, insertion-ordered body collection plus the
/// broad phase. One world belongs to one thread; a step is a pure function
/// of `(world state, delta)`.
///
/// Each sub-step runs a fixed pipeline: integrate, purge queued removals,
/// re-index the broad phase, detect, resolve. Host-facing output is the
/// ordered list of [`SensorEvent`]s returned from [`World::update`] plus the
/// body positions mutated in place.
pub struct World {
    cfg: WorldConfig,
    bodies: BodyStore,
    broadphase: BroadPhase,
    /// Deferred removal queue; drained at the purge stage of the next
    /// sub-step. May hold duplicates.
    removals: Vec<BodyId>,
    next_id: u32,
}

impl World {
    pub fn new(cfg: WorldConfig) -> Self {
        Self {
            cfg,
            bodies: BodyStore::default(),
            broadphase: BroadPhase::default(),
            removals: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.cfg
    }

    fn alloc_id(&mut self) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        id
    }

    // --- Factories ----------------------------------------------------------

    pub fn create_static_body(&mut self, desc: StaticDesc) -> BodyId {
        let id = self.alloc_id();
        self.bodies.push(Body::new_static(id, desc));
        id
    }

    pub fn create_player_body(&mut self, desc: PlayerDesc) -> BodyId {
        let id = self.alloc_id();
        self.bodies.push(Body::new_player(id, desc, self.cfg.gravity));
        id
    }

    pub fn create_bounce_body(&mut self, desc: BounceDesc) -> BodyId {
        let id = self.alloc_id();
        self.bodies.push(Body::new_bounce(id, desc, self.cfg.gravity));
        id
    }

    pub fn create_bullet_body(&mut self, desc: BulletDesc) -> BodyId {
        let id = self.alloc_id();
        self.bodies.push(Body::new_bullet(id, desc));
        id
    }

    // --- Host access --------------------------------------------------------

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.len() == 0
    }

    pub fn broadphase_stats(&self) -> BroadPhaseStats {
        self.broadphase.stats()
    }

    /// Schedule a body for removal at the next sub-step. Repeated calls and
    /// unknown ids are harmless.
    pub fn remove_body(&mut self, id: BodyId) {
        self.removals.push(id);
    }

    // --- Stepping -----------------------------------------------------------

    /// Advance the world by `delta_ms`, splitting into sub-steps of at most
    /// [`MAX_STEP_MS`]. Returns the sensor events of all sub-steps in order.
    pub fn update(&mut self, delta_ms: f64) -> Vec<SensorEvent> {
        let mut events = Vec::new();
        let mut remaining = delta_ms;
        let mut substeps = 0u32;
        while remaining > 0.0 {
            let dt = remaining.min(MAX_STEP_MS);
            self.step(dt, &mut events);
            remaining -= dt;
            substeps += 1;
        }
        trace!(delta_ms, substeps, events = events.len(), "world update");
        events
    }

    fn step(&mut self, delta: f64, events: &mut Vec<SensorEvent>) {
        self.integrate(delta, events);
        self.purge();
        self.broadphase.sync(&mut self.bodies);
        let contacts = self.detect(events);
        self.resolve(&contacts);
        self.arm_fall_timers();
    }

    /// Stage 1: advance every non-static body and flag world escapes.
    fn integrate(&mut self, delta: f64, events: &mut Vec<SensorEvent>) {
        for i in 0..self.bodies.len() {
            let body = self.bodies.at_mut(i);
            body.integrate(delta, &mut self.removals);
            if !body.is_static() && !self.cfg.bounds.contains(body.position()) {
                events.push(SensorEvent::Escaped {
                    body: body.id(),
                    key: body.user_key(),
                });
                self.removals.push(body.id());
            }
        }
    }

    /// Stage 2: drop queued bodies from the list and the broad phase.
    fn purge(&mut self) {
        if self.removals.is_empty() {
            return;
        }
        let mut ids: Vec<BodyId> = Vec::with_capacity(self.removals.len());
        for id in self.removals.drain(..) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        for &id in &ids {
            if let Some(body) = self.bodies.get_mut(id) {
                self.broadphase.remove_body(body);
            }
        }
        self.bodies.remove_many(&ids);
        debug!(removed = ids.len(), "purged bodies");
    }

    /// Stage 4: walk candidate pairs; emit sensor overlaps as encountered,
    /// collect bullet targets, then settle bullet hits; return the contacts
    /// for resolution.
    fn detect(&mut self, events: &mut Vec<SensorEvent>) -> Vec<Contact> {
        let mut contacts = Vec::new();
        // Per bullet, the bodies whose boxes its sweep crossed, in
        // first-encounter order.
        let mut bullet_targets: Vec<(BodyId, Vec<BodyId>)> = Vec::new();

        for (ia, ib) in self.broadphase.pairs() {
            let (Some(a), Some(b)) = (self.bodies.get(ia), self.bodies.get(ib)) else {
                continue;
            };
            let Some(overlap) = narrowphase::overlap_extents(&a.bounds(), &b.bounds()) else {
                continue;
            };
            if a.is_sensor() || b.is_sensor() {
                events.push(SensorEvent::Overlap {
                    a: ia,
                    b: ib,
                    a_key: a.user_key(),
                    b_key: b.user_key(),
                });
                continue;
            }
            let bullet = match (a.kind() == BodyKind::Bullet, b.kind() == BodyKind::Bullet) {
                (true, false) => Some((ia, ib)),
                (false, true) => Some((ib, ia)),
                _ => None,
            };
            match bullet {
                Some((bullet_id, target_id)) => {
                    match bullet_targets.iter_mut().find(|(id, _)| *id == bullet_id) {
                        Some((_, targets)) => targets.push(target_id),
                        None => bullet_targets.push((bullet_id, vec![target_id])),
                    }
                }
                None => contacts.push(Contact {
                    a: ia,
                    b: ib,
                    overlap,
                }),
            }
        }

        for (bullet_id, targets) in bullet_targets {
            self.settle_bullet(bullet_id, &targets, events);
        }
        contacts
    }

    /// Pick the nearest edge crossing among a bullet's targets and report the
    /// hit. Un-budgeted bullets and any bullet striking static geometry are
    /// spent on impact; budgeted bullets pass through the rest.
    fn settle_bullet(&mut self, bullet_id: BodyId, targets: &[BodyId], events: &mut Vec<SensorEvent>) {
        let bullet = self.bodies.get(bullet_id).expect("paired bullet exists");
        let (coefs, from, bullet_key, budgeted) = match bullet.bullet_probe() {
            Some(probe) => probe,
            None => return,
        };

        let mut best: Option<(DVec2, f64, BodyId)> = None;
        for &target_id in targets {
            let target = self.bodies.get(target_id).expect("paired target exists");
            if let Some((point, dist)) = narrowphase::nearest_edge_crossing(&coefs, from, &target.bounds()) {
                if best.map_or(true, |(_, d, _)| dist < d) {
                    best = Some((point, dist, target_id));
                }
            }
        }

        if let Some((point, _, target_id)) = best {
            let target = self.bodies.get(target_id).expect("paired target exists");
            events.push(SensorEvent::BulletHit {
                bullet: bullet_id,
                target: target_id,
                point,
                bullet_key,
                target_key: target.user_key(),
            });
            if !budgeted || target.kind() == BodyKind::Static {
                self.removals.push(bullet_id);
            }
        }
    }

    /// Stage 5: positional correction plus per-type response.
    fn resolve(&mut self, contacts: &[Contact]) {
        for contact in contacts {
            let (Some(a), Some(b)) = (self.bodies.get(contact.a), self.bodies.get(contact.b))
            else {
                continue;
            };
            // Filtering guarantees exactly one side is static.
            let (resolved_id, resolved, fixed) = if a.is_static() {
                (contact.b, b, a)
            } else {
                (contact.a, a, b)
            };
            let correction = correction_for(resolved, fixed, contact.overlap);
            let new_position = resolved.position() + correction;
            let body = self.bodies.get_mut(resolved_id).expect("contact body exists");
            body.apply_correction(correction);
            body.set_position(new_position);
        }
    }

    /// Post-pass: a player that is airborne with no active arc starts falling
    /// from its current height.
    fn arm_fall_timers(&mut self) {
        for i in 0..self.bodies.len() {
            self.bodies.at_mut(i).arm_fall_timer();
        }
    }
}

/// Disambiguated positional correction for a contact. Starts from the raw
/// per-axis overlap extents and ends as a vector pointing from the static
/// body toward the resolved body along the chosen axis.
fn correction_for(resolved: &Body, fixed: &Body, overlap: DVec2) -> DVec2 {
    let mut corr = overlap;
    let mut min_fix = true;
    let rb = resolved.bounds();
    let fb = fixed.bounds();
    let above = resolved.position().y < fixed.position().y;

    // An extent fully inside the static's extent can't be pushed out along
    // that axis.
    if rb.min.x > fb.min.x && rb.max.x < fb.max.x {
        corr.x = 0.0;
        min_fix = false;
    }
    if rb.min.y > fb.min.y && rb.max.y < fb.max.y {
        corr.y = 0.0;
        min_fix = false;
    }
    // A rising airborne player passes through platforms from below.
    if corr.y != 0.0
        && above
        && resolved.kind() == BodyKind::Player
        && resolved.move_dir_y() == -1
        && !resolved.is_on_ground()
    {
        corr.y = 0.0;
        min_fix = false;
    }
    // Landing bias: a shallow descent onto a platform resolves upward even
    // when the horizontal overlap is larger.
    if corr.y != 0.0 && above && resolved.move_dir_y() == 1 && corr.y < corr.x {
        corr.x = 0.0;
        min_fix = false;
    }
    if min_fix {
        if corr.x < corr.y {
            corr.y = 0.0;
        } else {
            corr.x = 0.0;
        }
    }
    if above {
        corr.y = -corr.y;
    }
    if resolved.position().x < fixed.position().x {
        corr.x = -corr.x;
    }
    corr
}
