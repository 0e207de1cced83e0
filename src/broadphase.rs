use std::collections::{BTreeMap, HashMap};

use crate::body::{Body, BodyStore};
use crate::types::*;

/// Regions are 512x512; keys come from an arithmetic shift of the floored
/// world coordinate, so geometry should sit on integer-friendly coordinates.
const REGION_SHIFT: i64 = 9;

fn region_coord(v: f64) -> i32 {
    ((v.floor() as i64) >> REGION_SHIFT) as i32
}

/// Regions covered by `bounds`, scanned y-outer/x-inner. The scan order is
/// part of the contract: region lists compare element-wise to detect
/// membership changes.
pub fn regions_of(bounds: &Aabb) -> Vec<RegionKey> {
    let x0 = region_coord(bounds.min.x);
    let x1 = region_coord(bounds.max.x);
    let y0 = region_coord(bounds.min.y);
    let y1 = region_coord(bounds.max.y);
    let mut out = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
    for sy in y0..=y1 {
        for sx in x0..=x1 {
            out.push((sx, sy));
        }
    }
    out
}

fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Candidate filter. Same-kind pairs never collide; bounce bodies only meet
/// static geometry and bullets; a bullet ignores the body that fired it.
pub fn can_collide(a: &Body, b: &Body) -> bool {
    if a.kind() == b.kind() {
        return false;
    }
    for (x, y) in [(a, b), (b, a)] {
        if x.kind() == BodyKind::Bounce
            && y.kind() != BodyKind::Static
            && y.kind() != BodyKind::Bullet
        {
            return false;
        }
        if x.bullet_owner() == Some(y.id()) {
            return false;
        }
    }
    true
}

/// Region-hashed candidate registry.
///
/// `pairs` counts, per candidate pair, the number of regions both bodies
/// currently occupy. A pair is born when two bodies first share any region
/// and dies when they share none, so a body can migrate incrementally
/// through overlapping regions without the candidate set losing or
/// double-counting an entry. The map is ordered because detection iterates
/// it and event order must be identical across runs.
#[derive(Default)]
pub struct BroadPhase {
    hash: HashMap<RegionKey, Vec<BodyId>>,
    pairs: BTreeMap<(BodyId, BodyId), u32>,
}

impl BroadPhase {
    /// Bring region membership and the pair table up to date after
    /// integration. New bodies register fully; statics never migrate;
    /// moved bodies re-index only when their region set actually changed.
    pub(crate) fn sync(&mut self, bodies: &mut BodyStore) {
        for i in 0..bodies.len() {
            if bodies.at(i).regions.is_empty() {
                self.register(bodies, i);
                continue;
            }
            if bodies.at(i).is_static() {
                continue;
            }
            if !bodies.at_mut(i).take_updated() {
                continue;
            }
            let regions = regions_of(&bodies.at(i).bounds);
            if regions == bodies.at(i).regions {
                continue;
            }
            self.reindex(bodies, i, regions);
        }
    }

    fn register(&mut self, bodies: &mut BodyStore, i: usize) {
        let id = bodies.at(i).id();
        let regions = regions_of(&bodies.at(i).bounds);
        for &r in &regions {
            let slot = self.hash.entry(r).or_default();
            for &other in slot.iter() {
                if can_collide(bodies.at(i), bodies.get(other).expect("registered body")) {
                    *self.pairs.entry(pair_key(id, other)).or_insert(0) += 1;
                }
            }
            slot.push(id);
        }
        bodies.at_mut(i).regions = regions;
    }

    fn reindex(&mut self, bodies: &mut BodyStore, i: usize, new_regions: Vec<RegionKey>) {
        let id = bodies.at(i).id();
        let old_regions = std::mem::take(&mut bodies.at_mut(i).regions);
        for &r in old_regions.iter().filter(|r| !new_regions.contains(r)) {
            self.leave_region(id, r);
        }
        for &r in new_regions.iter().filter(|r| !old_regions.contains(r)) {
            self.enter_region(bodies, i, id, r);
        }
        bodies.at_mut(i).regions = new_regions;
    }

    fn enter_region(&mut self, bodies: &BodyStore, i: usize, id: BodyId, r: RegionKey) {
        let slot = self.hash.entry(r).or_default();
        slot.push(id);
        for &other in slot.iter() {
            if other == id {
                continue;
            }
            if can_collide(bodies.at(i), bodies.get(other).expect("registered body")) {
                *self.pairs.entry(pair_key(id, other)).or_insert(0) += 1;
            }
        }
    }

    /// Splice `id` out of region `r`, then walk the survivors and drop one
    /// co-residence count from each pair involving `id`.
    fn leave_region(&mut self, id: BodyId, r: RegionKey) {
        let Some(slot) = self.hash.get_mut(&r) else {
            return;
        };
        if let Some(pos) = slot.iter().position(|&b| b == id) {
            slot.remove(pos);
        }
        for &other in slot.iter() {
            let key = pair_key(id, other);
            if let Some(count) = self.pairs.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.pairs.remove(&key);
                }
            }
        }
        if slot.is_empty() {
            self.hash.remove(&r);
        }
    }

    /// Detach a body entirely; afterwards it looks unregistered.
    pub(crate) fn remove_body(&mut self, body: &mut Body) {
        let id = body.id();
        for r in std::mem::take(&mut body.regions) {
            self.leave_region(id, r);
        }
    }

    pub(crate) fn pairs(&self) -> impl Iterator<Item = (BodyId, BodyId)> + '_ {
        self.pairs.keys().copied()
    }

    pub fn stats(&self) -> BroadPhaseStats {
        BroadPhaseStats {
            regions: self.hash.len(),
            entries: self.hash.values().map(Vec::len).sum(),
            pairs: self.pairs.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn pair_count(&self, a: BodyId, b: BodyId) -> Option<u32> {
        self.pairs.get(&pair_key(a, b)).copied()
    }

    #[cfg(test)]
    pub(crate) fn region_list(&self, r: RegionKey) -> &[BodyId] {
        self.hash.get(&r).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn store_with(bodies: Vec<Body>) -> BodyStore {
        let mut store = BodyStore::default();
        for b in bodies {
            store.push(b);
        }
        store
    }

    fn static_body(id: u32, cx: f64, cy: f64, w: f64, h: f64) -> Body {
        Body::new_static(
            BodyId(id),
            StaticDesc {
                position: DVec2::new(cx, cy),
                size: DVec2::new(w, h),
                is_sensor: false,
                user_key: None,
            },
        )
    }

    fn player_body(id: u32, cx: f64, cy: f64) -> Body {
        Body::new_player(
            BodyId(id),
            PlayerDesc {
                position: DVec2::new(cx, cy),
                size: DVec2::new(20.0, 40.0),
                move_speed: None,
                jump_height: None,
                user_key: None,
            },
            0.001,
        )
    }

    /// Every pair's count must equal the co-residence computed from the
    /// region hash, and every listed body must know its region.
    fn assert_consistent(grid: &BroadPhase, bodies: &BodyStore) {
        for (&r, list) in &grid.hash {
            for &id in list {
                let body = bodies.get(id).expect("listed body exists");
                assert!(body.regions.contains(&r), "{id:?} unaware of {r:?}");
            }
        }
        for (&(a, b), &count) in &grid.pairs {
            let ba = bodies.get(a).unwrap();
            let bb = bodies.get(b).unwrap();
            let shared = ba.regions.iter().filter(|r| bb.regions.contains(r)).count();
            assert_eq!(count as usize, shared, "pair ({a:?},{b:?})");
        }
    }

    #[test]
    fn test_regions_scan_order_and_shift() {
        let bounds = Aabb {
            min: DVec2::new(-1.0, 0.0),
            max: DVec2::new(600.0, 10.0),
        };
        // x spans regions -1..=1, y stays in 0.
        assert_eq!(regions_of(&bounds), vec![(-1, 0), (0, 0), (1, 0)]);
    }

    #[test]
    fn test_negative_coords_floor_toward_minus_infinity() {
        let bounds = Aabb {
            min: DVec2::new(-513.0, -1.0),
            max: DVec2::new(-1.0, -1.0),
        };
        assert_eq!(regions_of(&bounds), vec![(-2, -1), (-1, -1)]);
    }

    #[test]
    fn test_registration_creates_counted_pairs() {
        // Player box straddles the x=512 region seam; so does the floor.
        let mut store = store_with(vec![
            static_body(1, 512.0, 100.0, 2000.0, 40.0),
            player_body(2, 510.0, 100.0),
        ]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        // Player bounds [500, 520] span regions (0,0) and (1,0); the floor
        // covers both, so the pair is counted twice.
        assert_eq!(grid.pair_count(BodyId(1), BodyId(2)), Some(2));
        assert_consistent(&grid, &store);
    }

    #[test]
    fn test_same_kind_pairs_never_materialize() {
        let mut store = store_with(vec![
            static_body(1, 0.0, 0.0, 100.0, 100.0),
            static_body(2, 10.0, 10.0, 100.0, 100.0),
            player_body(3, 0.0, 0.0),
            player_body(4, 5.0, 0.0),
        ]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        assert_eq!(grid.pair_count(BodyId(1), BodyId(2)), None);
        assert_eq!(grid.pair_count(BodyId(3), BodyId(4)), None);
        assert!(grid.pair_count(BodyId(1), BodyId(3)).is_some());
        assert_consistent(&grid, &store);
    }

    #[test]
    fn test_bullet_owner_pairs_rejected() {
        let mut store = store_with(vec![player_body(1, 0.0, 0.0)]);
        store.push(Body::new_bullet(
            BodyId(2),
            BulletDesc {
                position: DVec2::ZERO,
                force: DVec2::new(1000.0, 500.0),
                owner: Some(BodyId(1)),
                range: None,
                user_key: None,
            },
        ));
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        assert_eq!(grid.pair_count(BodyId(1), BodyId(2)), None);
    }

    #[test]
    fn test_bounce_only_meets_static_and_bullet() {
        let mut store = store_with(vec![
            static_body(1, 0.0, 0.0, 100.0, 100.0),
            player_body(2, 0.0, 0.0),
        ]);
        store.push(Body::new_bounce(
            BodyId(3),
            BounceDesc {
                position: DVec2::ZERO,
                force: DVec2::new(100.0, -100.0),
                size: DVec2::new(10.0, 10.0),
                user_key: None,
            },
            0.001,
        ));
        store.push(Body::new_bullet(
            BodyId(4),
            BulletDesc {
                position: DVec2::ZERO,
                force: DVec2::new(1000.0, 500.0),
                owner: None,
                range: None,
                user_key: None,
            },
        ));
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        assert!(grid.pair_count(BodyId(1), BodyId(3)).is_some());
        assert!(grid.pair_count(BodyId(3), BodyId(4)).is_some());
        assert_eq!(grid.pair_count(BodyId(2), BodyId(3)), None);
        assert_consistent(&grid, &store);
    }

    #[test]
    fn test_migration_keeps_pair_membership() {
        let mut store = store_with(vec![
            static_body(1, 512.0, 100.0, 2000.0, 40.0),
            player_body(2, 480.0, 100.0),
        ]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        let before: Vec<_> = grid.pairs().collect();
        let count_before = grid.pair_count(BodyId(1), BodyId(2));

        // Walk the player across the x=512 seam one sub-step at a time.
        for step in 1..=10 {
            let body = store.get_mut(BodyId(2)).unwrap();
            body.set_position(DVec2::new(480.0 + step as f64 * 8.0, 100.0));
            let mut removals = Vec::new();
            body.integrate(16.0, &mut removals);
            grid.sync(&mut store);
            assert_eq!(grid.pairs().collect::<Vec<_>>(), before, "step {step}");
            assert_consistent(&grid, &store);
        }
        // Fully inside the second region now: count dropped to 1.
        let body = store.get_mut(BodyId(2)).unwrap();
        body.set_position(DVec2::new(800.0, 100.0));
        let mut removals = Vec::new();
        body.integrate(16.0, &mut removals);
        grid.sync(&mut store);
        assert_eq!(grid.pairs().collect::<Vec<_>>(), before);
        assert!(grid.pair_count(BodyId(1), BodyId(2)) <= count_before);
        assert_consistent(&grid, &store);
    }

    #[test]
    fn test_remove_body_clears_pairs_and_regions() {
        let mut store = store_with(vec![
            static_body(1, 0.0, 100.0, 1000.0, 40.0),
            player_body(2, 0.0, 100.0),
        ]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        assert!(grid.pair_count(BodyId(1), BodyId(2)).is_some());

        grid.remove_body(store.get_mut(BodyId(2)).unwrap());
        assert_eq!(grid.pair_count(BodyId(1), BodyId(2)), None);
        assert!(store.get(BodyId(2)).unwrap().regions.is_empty());
        for (_, list) in &grid.hash {
            assert!(!list.contains(&BodyId(2)));
        }

        // Looks unregistered: the next sync re-registers it from scratch.
        grid.sync(&mut store);
        assert!(grid.pair_count(BodyId(1), BodyId(2)).is_some());
        assert_consistent(&grid, &store);
    }

    #[test]
    fn test_static_bodies_never_reindex() {
        let mut store = store_with(vec![static_body(1, 0.0, 0.0, 100.0, 100.0)]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        let regions = store.get(BodyId(1)).unwrap().regions.clone();
        // Even a forced position change must not move a static's regions.
        store.get_mut(BodyId(1)).unwrap().is_updated = true;
        grid.sync(&mut store);
        assert_eq!(store.get(BodyId(1)).unwrap().regions, regions);
    }

    #[test]
    fn test_stats_counts() {
        let mut store = store_with(vec![
            static_body(1, 0.0, 0.0, 100.0, 100.0),
            player_body(2, 0.0, 0.0),
        ]);
        let mut grid = BroadPhase::default();
        grid.sync(&mut store);
        let stats = grid.stats();
        assert_eq!(stats.regions, 4);
        assert_eq!(stats.entries, 8);
        assert_eq!(stats.pairs, 1);
    }
}
