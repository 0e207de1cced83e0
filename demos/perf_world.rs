use glam::DVec2;
use platstep::*;
use std::time::Instant;

fn lcg(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

fn main() {
    let mut world = World::new(WorldConfig {
        bounds: Aabb {
            min: DVec2::new(-20_000.0, -20_000.0),
            max: DVec2::new(20_000.0, 20_000.0),
        },
        gravity: 0.001,
    });

    let mut seed = 1u32;
    let unit = |s: &mut u32| lcg(s) as f64 / u32::MAX as f64;

    // A field of static blocks on integer coordinates.
    let n_static = 500usize;
    for _ in 0..n_static {
        let x = (unit(&mut seed) * 30_000.0 - 15_000.0).floor();
        let y = (unit(&mut seed) * 30_000.0 - 15_000.0).floor();
        world.create_static_body(StaticDesc {
            position: DVec2::new(x, y),
            size: DVec2::new(100.0, 100.0),
            is_sensor: false,
            user_key: None,
        });
    }

    // A swarm of bullets crossing it.
    let n_bullets = 5_000usize;
    for _ in 0..n_bullets {
        let x = unit(&mut seed) * 20_000.0 - 10_000.0;
        let y = unit(&mut seed) * 20_000.0 - 10_000.0;
        let vx = unit(&mut seed) * 4_000.0 - 2_000.0;
        let vy = unit(&mut seed) * 4_000.0 - 2_000.0;
        world.create_bullet_body(BulletDesc {
            position: DVec2::new(x, y),
            force: DVec2::new(vx, vy),
            owner: None,
            range: Some(3_000.0),
            user_key: None,
        });
    }

    let mut hits = 0usize;
    let mut escaped = 0usize;
    let t0 = Instant::now();
    let ticks = 120;
    for _ in 0..ticks {
        for event in world.update(16.0) {
            match event {
                SensorEvent::BulletHit { .. } => hits += 1,
                SensorEvent::Escaped { .. } => escaped += 1,
                SensorEvent::Overlap { .. } => {}
            }
        }
    }
    let elapsed = t0.elapsed();

    let stats = world.broadphase_stats();
    println!(
        "statics={} bullets={} ticks={} elapsed={:.1?} ({:.3} ms/tick) hits={} escaped={} alive={} | regions={} entries={} pairs={}",
        n_static,
        n_bullets,
        ticks,
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / ticks as f64,
        hits,
        escaped,
        world.len(),
        stats.regions,
        stats.entries,
        stats.pairs
    );
}
