#![allow(clippy::type_complexity)]

use {
    arena::{Aabb, CollisionShape, DEFENDER_LINE_Z, TileGrid},
    bevy::{platform::collections::HashSet, prelude::*},
    common::{
        Dead, Defender, EnemyKilled, Health, Projectile, RetargetEnemies, SimSet, TICK_RATE,
        combat_active,
    },
    rand::Rng,
};

mod archetype;
pub use archetype::{Archetype, BaseStats};

#[cfg(test)]
mod tests_lifecycle;

/// Enemy-vs-enemy splash only applies once both units are past the
/// baseline band.
const SPLASH_BAND_Z: f32 = -12.0;
/// Live-enemy count past which per-hit splash notifications are suppressed.
const DENSE_FIELD_THRESHOLD: usize = 25;

pub struct EnemyPlugin;

impl Plugin for EnemyPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Enemy>()
            .register_type::<MoveDirection>()
            .register_type::<Frozen>()
            .register_type::<Airborne>()
            .register_type::<Displaced>();

        app.add_systems(
            Update,
            (
                retarget_enemies.in_set(SimSet::Schedule),
                (
                    move_enemies,
                    resolve_displacements,
                    resolve_airborne,
                    thaw_frozen,
                    update_tile_occupancy.after(move_enemies),
                )
                    .in_set(SimSet::Move),
                watch_collisions.in_set(SimSet::Collide),
                handle_dying_enemies.in_set(SimSet::Resolve),
                purge_destroyed_enemies.in_set(SimSet::Cleanup),
            )
                .run_if(combat_active),
        );
    }
}

// Components

/// A mobile hostile unit. All stats are frozen at spawn from the archetype
/// and the wave level; the coin drop is rolled only when the unit goes down.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Enemy {
    pub archetype: Archetype,
    pub level: u32,
    pub damage: f32,
    /// Units per tick.
    pub speed: f32,
    pub score: u64,
    pub coin_range: (u64, u64),
}

impl Default for Enemy {
    fn default() -> Self {
        Self::scaled(Archetype::Regular, 1)
    }
}

impl Enemy {
    pub fn scaled(archetype: Archetype, level: u32) -> Self {
        Self {
            archetype,
            level,
            damage: archetype.damage_at(level),
            speed: archetype.speed_at(level),
            score: archetype.score_at(level),
            coin_range: archetype.coin_range_at(level),
        }
    }
}

/// Straight-line heading toward the defender that was nearest when it was
/// last computed (spawn, resume, ally death).
#[derive(Component, Debug, Default, Clone, Reflect)]
#[reflect(Component)]
pub struct MoveDirection(pub Vec3);

/// Water-ally stun: movement halts until the timer expires.
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct Frozen {
    pub timer: Timer,
}

/// Earth-ally knock-up: the unit is carried through an arc and takes burst
/// damage on landing.
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct Airborne {
    pub timer: Timer,
    pub impact_damage: f32,
    pub ground_y: f32,
}

/// Linear displacement overriding normal movement: enemy-vs-enemy detours
/// and air-ally knockbacks. Movement resumes when the timer expires.
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct Displaced {
    pub from: Vec3,
    pub to: Vec3,
    pub timer: Timer,
}

/// Spawns a fully-statted enemy at the given position, heading along the
/// given direction.
pub fn build_enemy(
    commands: &mut Commands,
    position: Vec3,
    direction: Vec3,
    archetype: Archetype,
    level: u32,
) -> Entity {
    let stats = Enemy::scaled(archetype, level);
    let health = Health::full(archetype.health_at(level));
    commands
        .spawn((
            Transform::from_translation(position),
            CollisionShape::cube(archetype.base().half_extent),
            MoveDirection(direction),
            health,
            stats,
        ))
        .id()
}

/// Planar direction from `from` toward the nearest of the given positions,
/// falling back to straight down the lane when no defender is left.
pub fn direction_to_nearest(from: Vec3, targets: impl Iterator<Item = Vec3>) -> Vec3 {
    let nearest = targets.min_by(|a, b| {
        from.distance(*a)
            .partial_cmp(&from.distance(*b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let target = nearest.unwrap_or(Vec3::new(from.x, from.y, DEFENDER_LINE_Z));
    (target - from).with_y(0.0).normalize_or_zero()
}

// Systems

pub fn move_enemies(
    time: Res<Time>,
    mut enemies: Query<
        (&mut Transform, &MoveDirection, &Enemy),
        (
            Without<Dead>,
            Without<Frozen>,
            Without<Airborne>,
            Without<Displaced>,
        ),
    >,
) {
    for (mut transform, direction, enemy) in enemies.iter_mut() {
        let y = transform.translation.y;
        transform.translation += direction.0 * enemy.speed * TICK_RATE * time.delta_secs();
        transform.translation.y = y;
    }
}

pub fn update_tile_occupancy(
    mut grid: ResMut<TileGrid>,
    enemies: Query<&Transform, (With<Enemy>, Without<Dead>)>,
) {
    let positions: Vec<Vec2> = enemies
        .iter()
        .map(|t| Vec2::new(t.translation.x, t.translation.z))
        .collect();
    grid.update_occupancy(positions.iter().copied());
}

pub fn resolve_displacements(
    mut commands: Commands,
    time: Res<Time>,
    mut displaced: Query<(Entity, &mut Transform, &mut Displaced)>,
) {
    for (entity, mut transform, mut displacement) in displaced.iter_mut() {
        displacement.timer.tick(time.delta());
        if displacement.timer.is_finished() {
            transform.translation = displacement.to;
            commands.entity(entity).remove::<Displaced>();
        } else {
            transform.translation = displacement
                .from
                .lerp(displacement.to, displacement.timer.fraction());
        }
    }
}

pub fn resolve_airborne(
    mut commands: Commands,
    time: Res<Time>,
    mut airborne: Query<(Entity, &mut Transform, &mut Airborne, &mut Health)>,
) {
    for (entity, mut transform, mut status, mut health) in airborne.iter_mut() {
        status.timer.tick(time.delta());
        if status.timer.is_finished() {
            transform.translation.y = status.ground_y;
            health.current -= status.impact_damage;
            commands.entity(entity).remove::<Airborne>();
            debug!("Unit {entity:?} landed for {} impact damage", status.impact_damage);
        } else {
            transform.translation.y =
                status.ground_y + (status.timer.fraction() * std::f32::consts::PI).sin() * 2.0;
        }
    }
}

pub fn thaw_frozen(
    mut commands: Commands,
    time: Res<Time>,
    mut frozen: Query<(Entity, &mut Frozen)>,
) {
    for (entity, mut status) in frozen.iter_mut() {
        status.timer.tick(time.delta());
        if status.timer.is_finished() {
            commands.entity(entity).remove::<Frozen>();
            debug!("Unit {entity:?} thawed, movement resumes");
        }
    }
}

/// Per-tick bounding-volume poll of every live enemy against projectiles,
/// defenders and other enemies. Volumes are refreshed from the live
/// transforms on every pass.
pub fn watch_collisions(
    mut commands: Commands,
    enemies: Query<(Entity, &Transform, &CollisionShape, &Enemy), Without<Dead>>,
    projectiles: Query<(Entity, &Transform, &CollisionShape, &Projectile)>,
    defenders: Query<(Entity, &Transform, &CollisionShape), (With<Defender>, Without<Dead>)>,
    animating: Query<(), Or<(With<Frozen>, With<Airborne>, With<Displaced>)>>,
    mut healths: Query<&mut Health>,
    mut killed: MessageWriter<EnemyKilled>,
) {
    let snapshot: Vec<(Entity, Vec3, Aabb, f32)> = enemies
        .iter()
        .map(|(entity, transform, shape, enemy)| {
            (
                entity,
                transform.translation,
                Aabb::of(transform, shape),
                enemy.damage,
            )
        })
        .collect();
    let dense_field = snapshot.len() > DENSE_FIELD_THRESHOLD;

    let mut felled: HashSet<Entity> = HashSet::new();
    let mut spent_projectiles: HashSet<Entity> = HashSet::new();
    let defender_anchor = Vec3::new(0.0, 0.0, DEFENDER_LINE_Z);

    for (entity, position, volume, _) in &snapshot {
        if felled.contains(entity) {
            continue;
        }
        let Ok((_, _, _, enemy)) = enemies.get(*entity) else {
            continue;
        };

        // Projectile hits: damage the enemy, spend the projectile.
        for (proj_entity, proj_transform, proj_shape, projectile) in projectiles.iter() {
            if spent_projectiles.contains(&proj_entity) {
                continue;
            }
            if volume.intersects(&Aabb::of(proj_transform, proj_shape)) {
                if let Ok(mut health) = healths.get_mut(*entity) {
                    health.current -= projectile.damage;
                }
                spent_projectiles.insert(proj_entity);
                commands.entity(proj_entity).despawn();
            }
        }

        // Defender contact: the defender takes the hit, the enemy is spent
        // and still pays out score and coins.
        for (def_entity, def_transform, def_shape) in defenders.iter() {
            if volume.intersects(&Aabb::of(def_transform, def_shape)) {
                if let Ok(mut health) = healths.get_mut(def_entity) {
                    health.current -= enemy.damage;
                    debug!("Defender {def_entity:?} rammed for {} damage", enemy.damage);
                }
                fell_enemy(&mut commands, &mut killed, *entity, enemy);
                felled.insert(*entity);
                break;
            }
        }
        if felled.contains(entity) {
            continue;
        }

        // Enemy-vs-enemy: splash past the baseline band plus a short
        // lateral detour for the trailing unit, so stacks disperse.
        for (other, other_pos, other_volume, _) in &snapshot {
            if other == entity || felled.contains(other) {
                continue;
            }
            if !volume.intersects(other_volume) {
                continue;
            }

            if position.z >= SPLASH_BAND_Z && other_pos.z >= SPLASH_BAND_Z {
                if let Ok(mut health) = healths.get_mut(*other) {
                    health.current -= 0.1 * enemy.damage;
                    if !dense_field {
                        debug!("Unit {other:?} splashed for {}", 0.1 * enemy.damage);
                    }
                }
            }

            let behind = position.distance(defender_anchor) > other_pos.distance(defender_anchor);
            if behind && !animating.contains(*entity) {
                let away = (*other_pos - *position).normalize_or_zero();
                commands.entity(*entity).insert(Displaced {
                    from: *position,
                    to: *position - away,
                    timer: Timer::from_seconds(2.0, TimerMode::Once),
                });
            }
            break;
        }
    }
}

/// Lethality check runs before the purge within every tick: a depleted
/// enemy is marked `Dead` exactly once and pays out exactly once.
pub fn handle_dying_enemies(
    mut commands: Commands,
    dying: Query<(Entity, &Health, &Enemy), Without<Dead>>,
    mut killed: MessageWriter<EnemyKilled>,
) {
    for (entity, health, enemy) in dying.iter() {
        if health.is_depleted() {
            fell_enemy(&mut commands, &mut killed, entity, enemy);
        }
    }
}

pub fn purge_destroyed_enemies(
    mut commands: Commands,
    destroyed: Query<Entity, (With<Enemy>, With<Dead>)>,
) {
    for entity in destroyed.iter() {
        commands.entity(entity).despawn();
    }
}

pub fn retarget_enemies(
    mut messages: MessageReader<RetargetEnemies>,
    defenders: Query<&Transform, (With<Defender>, Without<Dead>)>,
    mut enemies: Query<(&Transform, &mut MoveDirection), (With<Enemy>, Without<Dead>)>,
) {
    if messages.read().next().is_none() {
        return;
    }
    let positions: Vec<Vec3> = defenders.iter().map(|t| t.translation).collect();
    for (transform, mut direction) in enemies.iter_mut() {
        direction.0 = direction_to_nearest(transform.translation, positions.iter().copied());
    }
    debug!("Recomputed headings for {} enemies", enemies.iter().count());
}

/// Rolls the coin drop, publishes the award and marks the unit destroyed.
/// Idempotent through the `Dead` marker: callers only reach this for units
/// not yet carrying it.
fn fell_enemy(
    commands: &mut Commands,
    killed: &mut MessageWriter<EnemyKilled>,
    entity: Entity,
    enemy: &Enemy,
) {
    let (min, max) = enemy.coin_range;
    let coins = rand::rng().random_range(min..=max.max(min));
    killed.write(EnemyKilled {
        entity,
        score: enemy.score,
        coins,
    });
    commands.entity(entity).insert(Dead);
    info!(
        "{:?} (level {}) destroyed: +{} score, +{} coins",
        enemy.archetype, enemy.level, enemy.score, coins
    );
}
