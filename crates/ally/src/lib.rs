//! Elemental allies: purchasable support defenders on the near row, one per
//! element, each casting its signature ability on a level-driven cooldown.

use {
    arena::{CollisionShape, DEFENDER_LINE_Z, TileGrid},
    bevy::{platform::collections::HashMap, prelude::*},
    common::{
        AllyDestroyed, Dead, Defender, Element, Health, RetargetEnemies, SimSet, combat_active,
    },
    enemy::{Airborne, Displaced, Enemy, Frozen},
    rand::Rng,
};

/// Air gusts only reach enemies already inside the corridor.
const CORRIDOR_NEAR_Z: f32 = -12.0;
const CORRIDOR_HALF_WIDTH: f32 = 5.0;

pub struct AllyPlugin;

impl Plugin for AllyPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Ally>()
            .init_resource::<AllyRoster>()
            .add_systems(
                Update,
                (
                    (cast_abilities, resolve_burn_pulses).in_set(SimSet::Schedule),
                    detect_destroyed_allies.in_set(SimSet::Resolve),
                    purge_destroyed_allies.in_set(SimSet::Cleanup),
                )
                    .run_if(combat_active),
            );
    }
}

/// One elemental support defender. At most one per element exists at a time;
/// the roster enforces that.
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct Ally {
    pub element: Element,
    pub level: u32,
    pub damage: f32,
    pub speed: f32,
    pub cooldown: Timer,
    /// Current next-level price, kept in sync with the inflated tables.
    pub upgrade_cost: u64,
}

/// Which elements are currently fielded, and by which entity.
#[derive(Resource, Debug, Default)]
pub struct AllyRoster(pub HashMap<Element, Entity>);

/// Delayed fire-ability aftershock bound to one enemy. The target dying
/// first makes the pulse a silent no-op.
#[derive(Component, Debug, Reflect)]
#[reflect(Component)]
pub struct BurnPulse {
    pub target: Entity,
    pub amount: f32,
    pub timer: Timer,
}

impl Default for BurnPulse {
    fn default() -> Self {
        Self {
            target: Entity::PLACEHOLDER,
            amount: 0.0,
            timer: Timer::default(),
        }
    }
}

/// Stat sheet for the next level, shown in the shop before committing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpgradePreview {
    pub level: u32,
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub cooldown: f32,
}

pub fn damage_at(level: u32) -> f32 {
    level as f32 / 2.0 + 0.5 * level as f32
}

pub fn speed_at(level: u32) -> f32 {
    level as f32 / 4.0
}

/// Seconds between casts.
pub fn cooldown_at(level: u32) -> f32 {
    2.0 / level as f32
}

fn health_bonus_at(level: u32) -> f32 {
    level.saturating_sub(1).max(1) as f32 * 10.0
}

impl Ally {
    fn at_level(element: Element, level: u32) -> Self {
        Self {
            element,
            level,
            damage: damage_at(level),
            speed: speed_at(level),
            cooldown: Timer::from_seconds(cooldown_at(level), TimerMode::Repeating),
            upgrade_cost: 0,
        }
    }

    /// Advances one level, stacking the health bonus on top of the current
    /// maximum and restoring to full. The price is refreshed separately,
    /// from the live tables.
    pub fn level_up(&mut self, health: &mut Health) {
        let cost = self.upgrade_cost;
        *self = Self::at_level(self.element, self.level + 1);
        self.upgrade_cost = cost;
        health.max += health_bonus_at(self.level);
        health.current = health.max;
    }

    pub fn preview_upgrade(&self, health: &Health) -> UpgradePreview {
        let next = self.level + 1;
        UpgradePreview {
            level: next,
            health: health.max + health_bonus_at(next),
            damage: damage_at(next),
            speed: speed_at(next),
            cooldown: cooldown_at(next),
        }
    }
}

/// Claims a random free tile on the near row and places a level-1 ally of
/// the element there. Returns `None` when the row is full.
pub fn spawn_ally(
    commands: &mut Commands,
    grid: &mut TileGrid,
    rng: &mut impl Rng,
    element: Element,
    next_cost: u64,
) -> Option<Entity> {
    let tile = grid.claim_free_tile(rng, DEFENDER_LINE_Z)?;

    let mut ally = Ally::at_level(element, 1);
    ally.upgrade_cost = next_cost;
    let health = Health::full(health_bonus_at(1));

    let entity = commands
        .spawn((
            Transform::from_xyz(tile.x, 0.0, tile.y),
            CollisionShape::cube(0.75),
            Defender,
            health,
            ally,
        ))
        .id();
    info!("{element:?} ally {entity:?} fielded at ({:.1}, {:.1})", tile.x, tile.y);
    Some(entity)
}

fn nearest_enemy<'a>(
    from: Vec3,
    candidates: impl Iterator<Item = (Entity, &'a Transform)>,
) -> Option<Entity> {
    candidates
        .min_by(|(_, a), (_, b)| {
            from.distance(a.translation)
                .partial_cmp(&from.distance(b.translation))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(entity, _)| entity)
}

/// Ticks every ally's cooldown and casts the elemental ability of each that
/// laps. All four abilities resolve against the live enemy snapshot.
pub fn cast_abilities(
    mut commands: Commands,
    time: Res<Time>,
    mut allies: Query<(&Transform, &mut Ally), Without<Dead>>,
    enemies: Query<(Entity, &Transform), (With<Enemy>, Without<Dead>)>,
    animating: Query<(), Or<(With<Frozen>, With<Airborne>, With<Displaced>)>>,
    mut healths: Query<&mut Health, With<Enemy>>,
) {
    for (transform, mut ally) in allies.iter_mut() {
        ally.cooldown.tick(time.delta());
        if !ally.cooldown.is_finished() {
            continue;
        }

        let origin = transform.translation;
        match ally.element {
            Element::Water => {
                let candidates = enemies.iter().filter(|(e, _)| !animating.contains(*e));
                if let Some(target) = nearest_enemy(origin, candidates) {
                    commands.entity(target).insert(Frozen {
                        timer: Timer::from_seconds(ally.damage / 3.0, TimerMode::Once),
                    });
                    debug!("Water froze {target:?} for {:.2}s", ally.damage / 3.0);
                }
            }
            Element::Fire => {
                for (target, _) in enemies.iter() {
                    if let Ok(mut health) = healths.get_mut(target) {
                        health.current -= ally.damage;
                    }
                    // Aftershocks taper off with each pulse.
                    for i in 0..=ally.level {
                        let offset = ally.cooldown.duration().as_secs_f32() * (i + 1) as f32;
                        commands.spawn(BurnPulse {
                            target,
                            amount: ally.damage / (i + 1) as f32,
                            timer: Timer::from_seconds(offset, TimerMode::Once),
                        });
                    }
                }
            }
            Element::Earth => {
                // Skip units mid-animation, or a fast cooldown re-tosses the
                // same victim before it ever lands.
                let candidates = enemies.iter().filter(|(e, _)| !animating.contains(*e));
                if let Some(target) = nearest_enemy(origin, candidates) {
                    commands.entity(target).insert(Airborne {
                        timer: Timer::from_seconds(1.0, TimerMode::Once),
                        impact_damage: ally.damage * 3.0,
                        ground_y: 0.0,
                    });
                }
            }
            Element::Air => {
                let knockback = ally.damage / 3.0;
                let duration = (3.0 / ally.damage).max(1.0);
                for (target, enemy_transform) in enemies.iter() {
                    let position = enemy_transform.translation;
                    let in_corridor = position.z >= CORRIDOR_NEAR_Z
                        && position.x.abs() <= CORRIDOR_HALF_WIDTH;
                    if !in_corridor || animating.contains(target) {
                        continue;
                    }
                    commands.entity(target).insert(Displaced {
                        from: position,
                        to: position - Vec3::Z * knockback,
                        timer: Timer::from_seconds(duration, TimerMode::Once),
                    });
                }
            }
        }
    }
}

pub fn resolve_burn_pulses(
    mut commands: Commands,
    time: Res<Time>,
    mut pulses: Query<(Entity, &mut BurnPulse)>,
    mut targets: Query<&mut Health, (With<Enemy>, Without<Dead>)>,
) {
    for (entity, mut pulse) in pulses.iter_mut() {
        pulse.timer.tick(time.delta());
        if !pulse.timer.is_finished() {
            continue;
        }
        if let Ok(mut health) = targets.get_mut(pulse.target) {
            health.current -= pulse.amount;
        }
        commands.entity(entity).despawn();
    }
}

/// A depleted ally frees its tile and its roster slot, and every enemy
/// re-aims since its target may just have vanished.
pub fn detect_destroyed_allies(
    mut commands: Commands,
    allies: Query<(Entity, &Transform, &Health, &Ally), Without<Dead>>,
    mut grid: ResMut<TileGrid>,
    mut roster: ResMut<AllyRoster>,
    mut destroyed: MessageWriter<AllyDestroyed>,
    mut retarget: MessageWriter<RetargetEnemies>,
) {
    for (entity, transform, health, ally) in allies.iter() {
        if !health.is_depleted() {
            continue;
        }
        grid.release(Vec2::new(transform.translation.x, transform.translation.z));
        roster.0.remove(&ally.element);
        commands.entity(entity).insert(Dead);
        destroyed.write(AllyDestroyed {
            element: ally.element,
        });
        retarget.write(RetargetEnemies);
        warn!("{:?} ally {entity:?} destroyed", ally.element);
    }
}

pub fn purge_destroyed_allies(
    mut commands: Commands,
    destroyed: Query<Entity, (With<Ally>, With<Dead>)>,
) {
    for entity in destroyed.iter() {
        commands.entity(entity).despawn();
    }
}
