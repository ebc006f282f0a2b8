#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

use {
    ally::{Ally, AllyPlugin, AllyRoster, BurnPulse, spawn_ally},
    arena::{DEFENDER_LINE_Z, TileGrid},
    bevy::prelude::*,
    bevy_common_assets::ron::RonAssetPlugin,
    common::{
        Dead, Defender, GameOver, GamePhase, Health, LevelCompleted, LevelStarted, PauseGame,
        Projectile, PurchaseAlly, PurchaseRejected, RequestUpgrade, ResumeGame, RetargetEnemies,
        SimSet, StartLevel, StopLevel, TowerDestroyed, UpgradeRejected, combat_active,
    },
    economy::{AllyPrices, EconomyPlugin, Wallet},
    enemy::{Enemy, EnemyPlugin},
    serde::Deserialize,
    spawner::{SpawnConfig, SpawnerPlugin, WaveSpawner},
    storage::{KEY_ACTIVE_SESSION, KEY_HIGHSCORE, Persistence},
    tower::{Tower, TowerPlugin, spawn_tower},
};

pub struct GameCorePlugin;

impl Plugin for GameCorePlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<bevy::state::app::StatesPlugin>() {
            app.add_plugins(bevy::state::app::StatesPlugin);
        }
        app.init_state::<GamePhase>();

        app.add_message::<StartLevel>();
        app.add_message::<StopLevel>();
        app.add_message::<PauseGame>();
        app.add_message::<ResumeGame>();
        app.add_message::<LevelStarted>();
        app.add_message::<LevelCompleted>();
        app.add_message::<GameOver>();
        app.add_message::<common::EnemyKilled>();
        app.add_message::<TowerDestroyed>();
        app.add_message::<common::AllyDestroyed>();
        app.add_message::<RetargetEnemies>();
        app.add_message::<PurchaseAlly>();
        app.add_message::<RequestUpgrade>();
        app.add_message::<PurchaseRejected>();
        app.add_message::<UpgradeRejected>();
        app.add_message::<common::GrantPurchase>();

        app.add_plugins((
            RonAssetPlugin::<GameConfig>::new(&["game.ron"]),
            RonAssetPlugin::<SpawnConfig>::new(&["spawner.ron"]),
        ));
        app.add_plugins((
            EnemyPlugin,
            SpawnerPlugin,
            TowerPlugin,
            AllyPlugin,
            EconomyPlugin,
        ));

        app.init_resource::<TileGrid>();
        app.init_resource::<GameLevel>();
        app.init_resource::<GameConfigHandles>();

        app.configure_sets(
            Update,
            (
                SimSet::Schedule,
                SimSet::Move,
                SimSet::Collide,
                SimSet::Resolve,
                SimSet::Cleanup,
            )
                .chain(),
        );

        app.add_systems(Startup, (bootstrap_session, start_loading));
        app.add_systems(
            Update,
            check_assets_ready.run_if(in_state(GamePhase::Loading)),
        );
        app.add_systems(OnEnter(GamePhase::Upgrading), setup_battlefield);
        app.add_systems(
            Update,
            (
                (handle_start_level, handle_purchase, handle_upgrade)
                    .run_if(in_state(GamePhase::Upgrading)),
                (tick_level_countdown, handle_stop_level, handle_pause)
                    .run_if(in_state(GamePhase::Running)),
                handle_resume.run_if(in_state(GamePhase::Paused)),
                // Both flip the phase, so they run after the frame's combat
                // has fully resolved, and a tower death discovered on the
                // final drain frame wins over the shop reopening.
                (
                    handle_game_over.run_if(combat_active),
                    finish_drain.run_if(in_state(GamePhase::Draining)),
                )
                    .chain()
                    .after(SimSet::Cleanup),
            ),
        );

        info!("Bastion core initialized");
    }
}

/// Session tunables loaded from `configs/session.game.ron`.
#[derive(Deserialize, Asset, Clone, Debug, Resource, Reflect)]
pub struct GameConfig {
    pub starting_coins: u64,
    /// Seconds of spawning per level before the drain begins.
    pub level_duration: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_coins: 1000,
            level_duration: 30.0,
        }
    }
}

#[derive(Resource, Default)]
struct GameConfigHandles {
    game: Handle<GameConfig>,
    waves: Handle<SpawnConfig>,
}

/// Wave counter and the remaining spawn window of the running level.
#[derive(Resource, Debug)]
pub struct GameLevel {
    pub current: u32,
    pub countdown: Timer,
}

impl Default for GameLevel {
    fn default() -> Self {
        Self {
            current: 0,
            countdown: Timer::from_seconds(30.0, TimerMode::Once),
        }
    }
}

/// Identity handed over by the hosting platform. Optional; without it the
/// session runs anonymously and skips the session-marker bookkeeping.
#[derive(Resource, Debug, Clone)]
pub struct PlayerSession {
    pub user_id: String,
    pub session_hash: String,
}

/// Pulls the stored highscore into the wallet and writes the session marker.
/// Storage trouble is never fatal to the game itself.
pub fn bootstrap_session(
    persistence: Option<ResMut<Persistence>>,
    session: Option<Res<PlayerSession>>,
    mut wallet: ResMut<Wallet>,
) {
    let Some(mut persistence) = persistence else {
        return;
    };

    match persistence.0.get(KEY_HIGHSCORE) {
        Ok(Some(raw)) => match raw.parse() {
            Ok(highscore) => {
                wallet.highscore = highscore;
                info!("Restored highscore {highscore}");
            }
            Err(_) => warn!("Stored highscore {raw:?} is not a number, starting from 0"),
        },
        Ok(None) => {
            if let Err(err) = persistence.0.set(KEY_HIGHSCORE, "0") {
                warn!("Could not initialize the profile: {err}");
            }
        }
        Err(err) => warn!("Could not read the profile: {err}"),
    }

    let Some(session) = session else {
        return;
    };
    match persistence.0.get(KEY_ACTIVE_SESSION) {
        Ok(Some(existing)) if !existing.is_empty() && existing != session.session_hash => {
            warn!(
                "Another session appears active for user {}, taking over",
                session.user_id
            );
        }
        Err(err) => warn!("Could not read the session marker: {err}"),
        _ => {}
    }
    if let Err(err) = persistence.0.set(KEY_ACTIVE_SESSION, &session.session_hash) {
        warn!("Could not write the session marker: {err}");
    }
}

fn start_loading(asset_server: Res<AssetServer>, mut handles: ResMut<GameConfigHandles>) {
    handles.game = asset_server.load("configs/session.game.ron");
    handles.waves = asset_server.load("configs/waves.spawner.ron");
}

fn check_assets_ready(
    mut commands: Commands,
    handles: Res<GameConfigHandles>,
    game_assets: Res<Assets<GameConfig>>,
    wave_assets: Res<Assets<SpawnConfig>>,
    mut wallet: ResMut<Wallet>,
    mut level: ResMut<GameLevel>,
    mut next_phase: ResMut<NextState<GamePhase>>,
) {
    let (Some(game), Some(waves)) = (
        game_assets.get(&handles.game),
        wave_assets.get(&handles.waves),
    ) else {
        return;
    };

    wallet.coins = game.starting_coins;
    level.countdown = Timer::from_seconds(game.level_duration, TimerMode::Once);
    commands.insert_resource(game.clone());
    commands.insert_resource(waves.clone());

    info!("Configs loaded, opening the shop");
    next_phase.set(GamePhase::Upgrading);
}

/// Places the tower the first time the shop opens. Later re-entries after
/// each drain find it already standing.
fn setup_battlefield(mut commands: Commands, towers: Query<(), With<Tower>>) {
    if towers.is_empty() {
        spawn_tower(&mut commands);
        info!("Tower raised on the defender line");
    }
}

pub fn handle_start_level(
    mut starts: MessageReader<StartLevel>,
    config: Res<GameConfig>,
    waves: Res<SpawnConfig>,
    mut level: ResMut<GameLevel>,
    mut spawner: ResMut<WaveSpawner>,
    mut towers: Query<&mut Tower>,
    mut allies: Query<&mut Ally>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut started: MessageWriter<LevelStarted>,
) {
    if starts.read().next().is_none() {
        return;
    }

    level.current += 1;
    level.countdown = Timer::from_seconds(config.level_duration, TimerMode::Once);
    spawner.arm(waves.interval_dividend, level.current);
    for mut tower in towers.iter_mut() {
        tower.cooldown.reset();
    }
    for mut ally in allies.iter_mut() {
        ally.cooldown.reset();
    }

    info!("Level {} started", level.current);
    next_phase.set(GamePhase::Running);
    started.write(LevelStarted {
        level: level.current,
    });
}

pub fn tick_level_countdown(
    time: Res<Time>,
    mut level: ResMut<GameLevel>,
    mut next_phase: ResMut<NextState<GamePhase>>,
) {
    level.countdown.tick(time.delta());
    if level.countdown.is_finished() {
        info!("Level {} spawn window closed, draining", level.current);
        next_phase.set(GamePhase::Draining);
    }
}

pub fn handle_stop_level(
    mut stops: MessageReader<StopLevel>,
    mut next_phase: ResMut<NextState<GamePhase>>,
) {
    if stops.read().next().is_some() {
        next_phase.set(GamePhase::Draining);
    }
}

/// Once the field is clear the level is over: defenders heal to full, stray
/// shots vanish, the highscore is settled and the shop reopens.
pub fn finish_drain(
    mut commands: Commands,
    enemies: Query<(), (With<Enemy>, Without<Dead>)>,
    leftovers: Query<Entity, Or<(With<Projectile>, With<BurnPulse>)>>,
    mut defenders: Query<&mut Health, With<Defender>>,
    destroyed: MessageReader<TowerDestroyed>,
    level: Res<GameLevel>,
    mut wallet: ResMut<Wallet>,
    persistence: Option<ResMut<Persistence>>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut completed: MessageWriter<LevelCompleted>,
) {
    // A tower death on the last drain frame ends the session, not the level;
    // the game-over handler owns that transition.
    if !enemies.is_empty() || !destroyed.is_empty() {
        return;
    }

    for mut health in defenders.iter_mut() {
        health.current = health.max;
    }
    for entity in leftovers.iter() {
        commands.entity(entity).despawn();
    }
    settle_highscore(&mut wallet, persistence);

    info!("Level {} complete with score {}", level.current, wallet.score);
    next_phase.set(GamePhase::Upgrading);
    completed.write(LevelCompleted {
        level: level.current,
        score: wallet.score,
    });
}

pub fn handle_pause(
    mut pauses: MessageReader<PauseGame>,
    mut next_phase: ResMut<NextState<GamePhase>>,
) {
    if pauses.read().next().is_some() {
        info!("Paused");
        next_phase.set(GamePhase::Paused);
    }
}

/// Unpausing re-aims every enemy: defenders may have been bought or lost
/// while the world stood still.
pub fn handle_resume(
    mut resumes: MessageReader<ResumeGame>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut retarget: MessageWriter<RetargetEnemies>,
) {
    if resumes.read().next().is_some() {
        info!("Resumed");
        next_phase.set(GamePhase::Running);
        retarget.write(RetargetEnemies);
    }
}

pub fn handle_game_over(
    mut destroyed: MessageReader<TowerDestroyed>,
    mut wallet: ResMut<Wallet>,
    persistence: Option<ResMut<Persistence>>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut over: MessageWriter<GameOver>,
) {
    if destroyed.read().next().is_none() {
        return;
    }

    settle_highscore(&mut wallet, persistence);
    warn!("Game over at score {}", wallet.score);
    next_phase.set(GamePhase::Over);
    over.write(GameOver {
        score: wallet.score,
    });
}

/// Fields a new ally: slot and tile are checked before any coin moves, so a
/// rejected purchase leaves the wallet untouched.
pub fn handle_purchase(
    mut commands: Commands,
    mut requests: MessageReader<PurchaseAlly>,
    mut wallet: ResMut<Wallet>,
    mut prices: ResMut<AllyPrices>,
    mut roster: ResMut<AllyRoster>,
    mut grid: ResMut<TileGrid>,
    mut allies: Query<&mut Ally>,
    mut rejected: MessageWriter<PurchaseRejected>,
) {
    for request in requests.read() {
        let element = request.element;
        if roster.0.contains_key(&element) {
            let err = economy::EconomyError::SlotOccupied(element);
            warn!("Purchase rejected: {err}");
            rejected.write(PurchaseRejected {
                element,
                reason: err.to_string(),
            });
            continue;
        }
        if grid.free_tiles_in_row(DEFENDER_LINE_Z) == 0 {
            warn!("Purchase rejected: no free tile on the defender line");
            rejected.write(PurchaseRejected {
                element,
                reason: "no free tile on the defender line".into(),
            });
            continue;
        }
        if let Err(err) = wallet.try_debit(prices.first_tier(element)) {
            warn!("Purchase rejected: {err}");
            rejected.write(PurchaseRejected {
                element,
                reason: err.to_string(),
            });
            continue;
        }

        wallet.total_upgrades += 1;
        let (score, total) = (wallet.score, wallet.total_upgrades);
        prices.inflate(score, total);

        let mut rng = rand::rng();
        let next_cost = prices.cost_at(element, 1);
        // The tile was verified free above.
        if let Some(entity) = spawn_ally(&mut commands, &mut grid, &mut rng, element, next_cost) {
            roster.0.insert(element, entity);
        }
        for mut ally in allies.iter_mut() {
            ally.upgrade_cost = prices.cost_at(ally.element, ally.level);
        }
    }
}

pub fn handle_upgrade(
    mut requests: MessageReader<RequestUpgrade>,
    mut wallet: ResMut<Wallet>,
    mut prices: ResMut<AllyPrices>,
    mut towers: Query<(&mut Tower, &mut Health), Without<Ally>>,
    mut allies: Query<(&mut Ally, &mut Health), Without<Tower>>,
    mut rejected: MessageWriter<UpgradeRejected>,
) {
    for request in requests.read() {
        if let Ok((mut tower, mut health)) = towers.get_mut(request.target) {
            match wallet.try_debit(tower.upgrade_cost) {
                Ok(()) => {
                    wallet.total_upgrades += 1;
                    tower.level_up(&mut health);
                    info!("Tower upgraded to level {}", tower.level);
                }
                Err(err) => {
                    warn!("Tower upgrade rejected: {err}");
                    rejected.write(UpgradeRejected {
                        target: request.target,
                        reason: err.to_string(),
                    });
                }
            }
            continue;
        }

        let upgraded = match allies.get_mut(request.target) {
            Ok((mut ally, mut health)) => match wallet.try_debit(ally.upgrade_cost) {
                Ok(()) => {
                    wallet.total_upgrades += 1;
                    ally.level_up(&mut health);
                    info!("{:?} ally upgraded to level {}", ally.element, ally.level);
                    true
                }
                Err(err) => {
                    warn!("{:?} ally upgrade rejected: {err}", ally.element);
                    rejected.write(UpgradeRejected {
                        target: request.target,
                        reason: err.to_string(),
                    });
                    false
                }
            },
            Err(_) => {
                warn!("Upgrade target {:?} not found", request.target);
                rejected.write(UpgradeRejected {
                    target: request.target,
                    reason: "no upgradable defender at that target".into(),
                });
                false
            }
        };

        // Ally upgrades inflate the ladders; the tower's fixed table is
        // untouched by inflation.
        if upgraded {
            let (score, total) = (wallet.score, wallet.total_upgrades);
            prices.inflate(score, total);
            for (mut ally, _) in allies.iter_mut() {
                ally.upgrade_cost = prices.cost_at(ally.element, ally.level);
            }
        }
    }
}

fn settle_highscore(wallet: &mut Wallet, persistence: Option<ResMut<Persistence>>) {
    if wallet.score <= wallet.highscore {
        return;
    }
    wallet.highscore = wallet.score;
    info!("New highscore: {}", wallet.highscore);
    if let Some(mut persistence) = persistence
        && let Err(err) = persistence
            .0
            .set(KEY_HIGHSCORE, &wallet.highscore.to_string())
    {
        warn!("Could not persist the highscore: {err}");
    }
}

#[cfg(test)]
mod tests_integration;
