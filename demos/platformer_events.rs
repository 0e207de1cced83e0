use glam::DVec2;
use platstep::*;

fn main() {
    let mut world = World::new(WorldConfig {
        bounds: Aabb {
            min: DVec2::new(-5000.0, -5000.0),
            max: DVec2::new(5000.0, 5000.0),
        },
        gravity: 0.001,
    });

    let floor = world.create_static_body(StaticDesc {
        position: DVec2::new(0.0, 200.0),
        size: DVec2::new(2000.0, 40.0),
        is_sensor: false,
        user_key: Some(1),
    });
    let zone = world.create_static_body(StaticDesc {
        position: DVec2::new(300.0, 140.0),
        size: DVec2::new(80.0, 80.0),
        is_sensor: true,
        user_key: Some(2),
    });
    let wall = world.create_static_body(StaticDesc {
        position: DVec2::new(600.0, 130.0),
        size: DVec2::new(40.0, 100.0),
        is_sensor: false,
        user_key: Some(3),
    });
    let player = world.create_player_body(PlayerDesc {
        position: DVec2::new(0.0, 100.0),
        size: DVec2::new(20.0, 40.0),
        move_speed: None,
        jump_height: None,
        user_key: Some(10),
    });

    println!("floor={floor:?} zone={zone:?} wall={wall:?} player={player:?}");

    // Let the player land, then run right through the sensor zone while a
    // bullet flies at the wall.
    for tick in 0..240 {
        if tick == 30 {
            world.body_mut(player).unwrap().walk(MoveDir::Right);
        }
        if tick == 60 {
            world.create_bullet_body(BulletDesc {
                position: DVec2::new(0.0, 120.0),
                force: DVec2::new(4000.0, 100.0),
                owner: Some(player),
                range: None,
                user_key: Some(11),
            });
        }
        for event in world.update(16.0) {
            match event {
                SensorEvent::Escaped { body, key } => {
                    println!("[{tick:3}] escaped: {body:?} key={key:?}");
                }
                SensorEvent::Overlap { a, b, .. } => {
                    println!("[{tick:3}] overlap: {a:?} <-> {b:?}");
                }
                SensorEvent::BulletHit {
                    bullet,
                    target,
                    point,
                    ..
                } => {
                    println!(
                        "[{tick:3}] hit: {bullet:?} -> {target:?} at ({:.1},{:.1})",
                        point.x, point.y
                    );
                }
            }
        }
    }

    let body = world.body(player).unwrap();
    let stats = world.broadphase_stats();
    println!(
        "player at ({:.1},{:.1}) on_ground={} | regions={} entries={} pairs={}",
        body.position().x,
        body.position().y,
        body.is_on_ground(),
        stats.regions,
        stats.entries,
        stats.pairs
    );
}
