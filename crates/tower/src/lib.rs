//! The main tower: the anchor defender on the center of the near row. It
//! cannot be repositioned and losing it ends the session.

use {
    arena::{CollisionShape, DEFENDER_LINE_Z},
    bevy::prelude::*,
    common::{
        Dead, Defender, Health, Projectile, SimSet, TICK_RATE, TowerDestroyed, combat_active,
    },
    enemy::Enemy,
};

/// Upgrade price per current level, clamped to the last entry past the
/// table's end.
pub const PRICE_TABLE: [u64; 13] = [
    5, 10, 20, 50, 100, 200, 500, 1000, 2000, 4000, 8000, 12000, 16000,
];

pub struct TowerPlugin;

impl Plugin for TowerPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Tower>().add_systems(
            Update,
            (
                tower_attack.in_set(SimSet::Schedule),
                move_projectiles.in_set(SimSet::Move),
                detect_tower_destroyed.in_set(SimSet::Resolve),
            )
                .run_if(combat_active),
        );
    }
}

#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct Tower {
    pub level: u32,
    pub damage: f32,
    /// Projectile speed, units per tick.
    pub speed: f32,
    pub cooldown: Timer,
    pub upgrade_cost: u64,
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

pub fn upgrade_cost_at(level: u32) -> u64 {
    let index = (level.max(1) as usize - 1).min(PRICE_TABLE.len() - 1);
    PRICE_TABLE[index]
}

pub fn damage_at(level: u32) -> f32 {
    level as f32 / 2.0 + 0.5 * level as f32
}

pub fn projectile_speed_at(level: u32) -> f32 {
    let numerator = level.saturating_sub(3).max(1) as f32;
    numerator / if level > 6 { 10.0 } else { 6.0 }
}

/// Seconds between shots.
pub fn cooldown_at(level: u32) -> f32 {
    4.0 / (level as f32 * 2.0)
}

impl Tower {
    fn at_level(level: u32) -> Self {
        Self {
            level,
            damage: damage_at(level),
            speed: projectile_speed_at(level),
            cooldown: Timer::from_seconds(cooldown_at(level), TimerMode::Repeating),
            upgrade_cost: upgrade_cost_at(level),
        }
    }

    /// Advances one level, stacking the health bonus on top of the current
    /// maximum and restoring to full.
    pub fn level_up(&mut self, health: &mut Health) {
        *self = Self::at_level(self.level + 1);
        health.max += self.level as f32 * 10.0;
        health.current = health.max;
    }

    /// Side-effect-free stat sheet for the next level.
    pub fn preview_upgrade(&self, health: &Health) -> UpgradePreview {
        let next = self.level + 1;
        UpgradePreview {
            level: next,
            health: health.max + next as f32 * 10.0,
            damage: damage_at(next),
            speed: projectile_speed_at(next),
            cooldown: cooldown_at(next),
        }
    }
}

/// Places the level-1 tower on its reserved tile.
pub fn spawn_tower(commands: &mut Commands) -> Entity {
    let tower = Tower::at_level(1);
    let health = Health::full(10.0);

    commands
        .spawn((
            Transform::from_xyz(0.0, 0.0, DEFENDER_LINE_Z),
            CollisionShape::cube(1.0),
            Defender,
            health,
            tower,
        ))
        .id()
}

/// Fires at the nearest live enemy whenever the cooldown laps. The shot's
/// heading is fixed at fire time.
pub fn tower_attack(
    mut commands: Commands,
    time: Res<Time>,
    mut towers: Query<(&Transform, &mut Tower), Without<Dead>>,
    enemies: Query<&Transform, (With<Enemy>, Without<Dead>)>,
) {
    for (transform, mut tower) in towers.iter_mut() {
        tower.cooldown.tick(time.delta());
        if !tower.cooldown.is_finished() {
            continue;
        }

        let origin = transform.translation;
        let Some(target) = enemies.iter().map(|t| t.translation).min_by(|a, b| {
            origin
                .distance(*a)
                .partial_cmp(&origin.distance(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            continue;
        };

        let direction = (target - origin).with_y(0.0).normalize_or_zero();
        commands.spawn((
            Transform::from_translation(origin),
            CollisionShape::cube(0.1),
            Projectile {
                damage: tower.damage,
                speed: tower.speed,
                direction,
                origin,
            },
        ));
    }
}

pub fn move_projectiles(
    mut commands: Commands,
    time: Res<Time>,
    mut projectiles: Query<(Entity, &mut Transform, &Projectile)>,
) {
    for (entity, mut transform, projectile) in projectiles.iter_mut() {
        transform.translation +=
            projectile.direction * projectile.speed * TICK_RATE * time.delta_secs();
        if transform.translation.distance(projectile.origin) > Projectile::MAX_TRAVEL {
            commands.entity(entity).despawn();
        }
    }
}

pub fn detect_tower_destroyed(
    mut commands: Commands,
    towers: Query<(Entity, &Health), (With<Tower>, Without<Dead>)>,
    mut destroyed: MessageWriter<TowerDestroyed>,
) {
    for (entity, health) in towers.iter() {
        if health.is_depleted() {
            commands.entity(entity).insert(Dead);
            destroyed.write(TowerDestroyed);
            warn!("The tower has fallen");
        }
    }
}
