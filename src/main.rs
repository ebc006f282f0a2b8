use {
    bevy::{app::ScheduleRunnerPlugin, asset::AssetPlugin, log::LogPlugin, prelude::*},
    common::{GameOver, GamePhase, StartLevel},
    game_core::{GameCorePlugin, PlayerSession},
    std::time::Duration,
    storage::Persistence,
};

fn main() {
    let persistence = match Persistence::json_file("profile.json") {
        Ok(persistence) => persistence,
        Err(err) => {
            eprintln!("Profile unavailable ({err}), progress will not be saved");
            Persistence::in_memory()
        }
    };

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        )
        .add_plugins((LogPlugin::default(), AssetPlugin::default()))
        .add_plugins(GameCorePlugin)
        .insert_resource(persistence)
        .insert_resource(PlayerSession {
            user_id: "local".into(),
            session_hash: "local-session".into(),
        })
        .add_systems(OnEnter(GamePhase::Upgrading), queue_next_level)
        .add_systems(Update, exit_when_over.run_if(in_state(GamePhase::Over)))
        .run();
}

/// Headless driver: starts the next level as soon as the shop opens.
fn queue_next_level(mut starts: MessageWriter<StartLevel>) {
    starts.write(StartLevel);
}

fn exit_when_over(mut over: MessageReader<GameOver>, mut exit: MessageWriter<AppExit>) {
    if let Some(end) = over.read().next() {
        info!("Session ended with score {}", end.score);
        exit.write(AppExit::Success);
    }
}
