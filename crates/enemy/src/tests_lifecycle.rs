use {
    super::*,
    bevy::time::TimePlugin,
    common::{EnemyKilled, RetargetEnemies},
    std::time::Duration,
};

#[derive(Resource, Default)]
struct Kills(Vec<EnemyKilled>);

fn capture_kills(mut reader: MessageReader<EnemyKilled>, mut kills: ResMut<Kills>) {
    kills.0.extend(reader.read().cloned());
}

fn setup_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins.build().disable::<TimePlugin>());
    app.insert_resource(Time::<()>::default());
    app.init_resource::<TileGrid>();
    app.init_resource::<Kills>();
    app.add_message::<EnemyKilled>();
    app.add_message::<RetargetEnemies>();
    app
}

fn advance(app: &mut App, secs: f32) {
    app.world_mut()
        .resource_mut::<Time>()
        .advance_by(Duration::from_secs_f32(secs));
    app.update();
}

fn spawn_enemy(app: &mut App, position: Vec3, direction: Vec3, archetype: Archetype) -> Entity {
    app.world_mut()
        .spawn((
            Transform::from_translation(position),
            CollisionShape::cube(archetype.base().half_extent),
            MoveDirection(direction),
            Health::full(archetype.health_at(1)),
            Enemy::scaled(archetype, 1),
        ))
        .id()
}

#[test]
fn enemies_advance_along_heading() {
    let mut app = setup_app();
    app.add_systems(Update, move_enemies);

    let enemy = spawn_enemy(
        &mut app,
        Vec3::new(0.0, 0.0, arena::ENEMY_BASELINE_Z),
        Vec3::Z,
        Archetype::Regular,
    );

    advance(&mut app, 1.0 / 60.0);

    let transform = app.world().get::<Transform>(enemy).unwrap();
    // Regular level 1 moves 0.05 units per tick.
    assert!((transform.translation.z - (arena::ENEMY_BASELINE_Z + 0.05)).abs() < 1e-4);
    assert_eq!(transform.translation.x, 0.0);
    assert_eq!(transform.translation.y, 0.0);
}

#[test]
fn frozen_enemy_holds_position_until_thawed() {
    let mut app = setup_app();
    app.add_systems(Update, (thaw_frozen, move_enemies).chain());

    let enemy = spawn_enemy(&mut app, Vec3::ZERO, Vec3::Z, Archetype::Fast);
    app.world_mut().entity_mut(enemy).insert(Frozen {
        timer: Timer::from_seconds(0.5, TimerMode::Once),
    });

    advance(&mut app, 0.2);
    let frozen_z = app.world().get::<Transform>(enemy).unwrap().translation.z;
    assert_eq!(frozen_z, 0.0);

    // Past the stun window the marker is gone and movement resumes.
    advance(&mut app, 0.4);
    assert!(app.world().get::<Frozen>(enemy).is_none());
    advance(&mut app, 1.0 / 60.0);
    let thawed_z = app.world().get::<Transform>(enemy).unwrap().translation.z;
    assert!(thawed_z > 0.0);
}

#[test]
fn overkill_awards_exactly_one_kill() {
    let mut app = setup_app();
    app.add_systems(
        Update,
        (
            watch_collisions,
            handle_dying_enemies,
            capture_kills,
            purge_destroyed_enemies,
        )
            .chain(),
    );

    let enemy = spawn_enemy(&mut app, Vec3::ZERO, Vec3::Z, Archetype::Regular);

    // Two simultaneous hits, each lethal on its own.
    for _ in 0..2 {
        app.world_mut().spawn((
            Transform::from_translation(Vec3::ZERO),
            CollisionShape::cube(0.1),
            Projectile {
                damage: 1.0,
                speed: 0.5,
                direction: Vec3::Z,
                origin: Vec3::new(0.0, 0.0, DEFENDER_LINE_Z),
            },
        ));
    }

    advance(&mut app, 1.0 / 60.0);
    advance(&mut app, 1.0 / 60.0);

    let kills = app.world().resource::<Kills>();
    assert_eq!(kills.0.len(), 1);
    assert_eq!(kills.0[0].entity, enemy);
    assert_eq!(kills.0[0].score, Archetype::Regular.score_at(1));
    assert!(app.world().get_entity(enemy).is_err());
}

#[test]
fn defender_contact_spends_enemy_and_damages_defender() {
    let mut app = setup_app();
    app.add_systems(
        Update,
        (
            watch_collisions,
            handle_dying_enemies,
            capture_kills,
            purge_destroyed_enemies,
        )
            .chain(),
    );

    let defender = app
        .world_mut()
        .spawn((
            Transform::from_xyz(0.0, 0.0, DEFENDER_LINE_Z),
            CollisionShape::cube(0.5),
            Defender,
            Health::full(10.0),
        ))
        .id();
    let enemy = spawn_enemy(
        &mut app,
        Vec3::new(0.0, 0.0, DEFENDER_LINE_Z - 0.8),
        Vec3::Z,
        Archetype::Strong,
    );

    advance(&mut app, 1.0 / 60.0);
    advance(&mut app, 1.0 / 60.0);

    // Strong level 1 hits for 2.
    let defender_health = app.world().get::<Health>(defender).unwrap();
    assert_eq!(defender_health.current, 8.0);

    // The enemy still pays out even though its health never depleted.
    let kills = app.world().resource::<Kills>();
    assert_eq!(kills.0.len(), 1);
    assert_eq!(kills.0[0].entity, enemy);
    assert!(app.world().get_entity(enemy).is_err());
}

#[test]
fn trailing_collider_splashes_and_detours() {
    let mut app = setup_app();
    app.add_systems(Update, watch_collisions);

    // Both past the baseline band; the leader is closer to the defender line.
    let leader = spawn_enemy(&mut app, Vec3::new(0.0, 0.0, 0.5), Vec3::Z, Archetype::Regular);
    let trailer = spawn_enemy(&mut app, Vec3::new(0.0, 0.0, 0.0), Vec3::Z, Archetype::Regular);

    advance(&mut app, 1.0 / 60.0);

    // The trailing unit detours; the leader keeps its course.
    assert!(app.world().get::<Displaced>(trailer).is_some());
    assert!(app.world().get::<Displaced>(leader).is_none());

    // Splash damage landed on at least one side of the pair.
    let leader_health = app.world().get::<Health>(leader).unwrap().current;
    let trailer_health = app.world().get::<Health>(trailer).unwrap().current;
    assert!(leader_health < 1.0 || trailer_health < 1.0);
}

#[test]
fn no_splash_on_the_baseline_row() {
    let mut app = setup_app();
    app.add_systems(Update, watch_collisions);

    let z = arena::ENEMY_BASELINE_Z;
    let a = spawn_enemy(&mut app, Vec3::new(0.0, 0.0, z), Vec3::Z, Archetype::Regular);
    let b = spawn_enemy(&mut app, Vec3::new(0.3, 0.0, z), Vec3::Z, Archetype::Regular);

    advance(&mut app, 1.0 / 60.0);

    assert_eq!(app.world().get::<Health>(a).unwrap().current, 1.0);
    assert_eq!(app.world().get::<Health>(b).unwrap().current, 1.0);
}

#[test]
fn displacement_carries_and_releases() {
    let mut app = setup_app();
    app.add_systems(Update, resolve_displacements);

    let enemy = spawn_enemy(&mut app, Vec3::ZERO, Vec3::Z, Archetype::Regular);
    app.world_mut().entity_mut(enemy).insert(Displaced {
        from: Vec3::ZERO,
        to: Vec3::new(1.0, 0.0, 0.0),
        timer: Timer::from_seconds(1.0, TimerMode::Once),
    });

    advance(&mut app, 0.5);
    let midway = app.world().get::<Transform>(enemy).unwrap().translation;
    assert!((midway.x - 0.5).abs() < 1e-4);

    advance(&mut app, 0.6);
    let settled = app.world().get::<Transform>(enemy).unwrap().translation;
    assert_eq!(settled, Vec3::new(1.0, 0.0, 0.0));
    assert!(app.world().get::<Displaced>(enemy).is_none());
}

#[test]
fn airborne_enemy_takes_impact_damage_on_landing() {
    let mut app = setup_app();
    app.add_systems(Update, resolve_airborne);

    let enemy = spawn_enemy(&mut app, Vec3::ZERO, Vec3::Z, Archetype::Fat);
    app.world_mut().entity_mut(enemy).insert(Airborne {
        timer: Timer::from_seconds(1.0, TimerMode::Once),
        impact_damage: 1.5,
        ground_y: 0.0,
    });

    advance(&mut app, 0.5);
    assert!(app.world().get::<Transform>(enemy).unwrap().translation.y > 0.0);
    assert_eq!(app.world().get::<Health>(enemy).unwrap().current, 2.0);

    advance(&mut app, 0.6);
    assert_eq!(app.world().get::<Transform>(enemy).unwrap().translation.y, 0.0);
    assert_eq!(app.world().get::<Health>(enemy).unwrap().current, 0.5);
    assert!(app.world().get::<Airborne>(enemy).is_none());
}

#[test]
fn retarget_points_enemies_at_nearest_defender() {
    let mut app = setup_app();
    app.add_systems(Update, retarget_enemies);

    app.world_mut().spawn((
        Transform::from_xyz(4.0, 0.0, DEFENDER_LINE_Z),
        CollisionShape::cube(0.5),
        Defender,
        Health::full(10.0),
    ));
    let enemy = spawn_enemy(
        &mut app,
        Vec3::new(0.0, 0.0, arena::ENEMY_BASELINE_Z),
        Vec3::ZERO,
        Archetype::Regular,
    );

    app.world_mut()
        .resource_mut::<Messages<RetargetEnemies>>()
        .write(RetargetEnemies);
    advance(&mut app, 1.0 / 60.0);

    let direction = app.world().get::<MoveDirection>(enemy).unwrap().0;
    let expected = (Vec3::new(4.0, 0.0, DEFENDER_LINE_Z)
        - Vec3::new(0.0, 0.0, arena::ENEMY_BASELINE_Z))
    .normalize();
    assert!((direction - expected).length() < 1e-4);
}

#[test]
fn direction_falls_back_down_the_lane() {
    let direction = direction_to_nearest(Vec3::new(2.0, 0.0, -6.0), std::iter::empty());
    assert_eq!(direction, Vec3::Z);
}
