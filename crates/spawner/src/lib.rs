//! Wave scheduling: one periodic spawner that releases enemies on the far
//! row, faster at higher levels.

use {
    arena::{ENEMY_BASELINE_Z, TileGrid},
    bevy::prelude::*,
    common::{Dead, Defender, GamePhase, SimSet},
    enemy::{Archetype, build_enemy, direction_to_nearest},
    rand::Rng,
    serde::Deserialize,
};

pub struct SpawnerPlugin;

impl Plugin for SpawnerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WaveSpawner>().add_systems(
            Update,
            spawn_waves
                .in_set(SimSet::Schedule)
                .run_if(in_state(GamePhase::Running)),
        );
    }
}

/// Tunables loaded from `configs/spawner.ron`.
#[derive(Deserialize, Asset, Clone, Debug, Resource, Reflect)]
pub struct SpawnConfig {
    /// Seconds between spawns at level 1; halves every two levels.
    pub interval_dividend: f32,
    /// Placement re-rolls before a wave slot is abandoned.
    pub max_spawn_attempts: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            interval_dividend: 3.0,
            max_spawn_attempts: 5,
        }
    }
}

/// Interval between spawns for a level, bottoming out at the dividend once
/// per half-level-step.
pub fn spawn_interval(dividend: f32, level: u32) -> f32 {
    dividend / (level as f32 / 2.0).max(1.0)
}

/// The single periodic release schedule. Re-armed at the start of every
/// level; ticking only happens while the level runs, so draining a level
/// leaves no pending spawns behind.
#[derive(Resource, Debug)]
pub struct WaveSpawner {
    pub level: u32,
    pub timer: Timer,
}

impl Default for WaveSpawner {
    fn default() -> Self {
        let mut spawner = Self {
            level: 0,
            timer: Timer::from_seconds(1.0, TimerMode::Repeating),
        };
        spawner.timer.pause();
        spawner
    }
}

impl WaveSpawner {
    pub fn arm(&mut self, dividend: f32, level: u32) {
        self.level = level;
        self.timer = Timer::from_seconds(spawn_interval(dividend, level), TimerMode::Repeating);
    }
}

pub fn spawn_waves(
    mut commands: Commands,
    time: Res<Time>,
    config: Res<SpawnConfig>,
    mut spawner: ResMut<WaveSpawner>,
    grid: Res<TileGrid>,
    defenders: Query<&Transform, (With<Defender>, Without<Dead>)>,
) {
    spawner.timer.tick(time.delta());
    if !spawner.timer.is_finished() {
        return;
    }

    let mut rng = rand::rng();
    let archetype = Archetype::ALL[rng.random_range(0..Archetype::ALL.len())];

    let mut placement = None;
    for _ in 0..config.max_spawn_attempts {
        if let Some(tile) = grid.random_tile_in_row(&mut rng, ENEMY_BASELINE_Z)
            && !grid.is_blocked(tile)
        {
            placement = Some(tile);
            break;
        }
    }
    let Some(tile) = placement else {
        warn!("Spawn row congested, skipping a {archetype:?} spawn");
        return;
    };

    let position = Vec3::new(tile.x, 0.0, tile.y);
    let direction = direction_to_nearest(position, defenders.iter().map(|t| t.translation));
    let entity = build_enemy(&mut commands, position, direction, archetype, spawner.level);
    debug!(
        "Released {archetype:?} {entity:?} at ({:.1}, {:.1}) for level {}",
        tile.x, tile.y, spawner.level
    );
}
