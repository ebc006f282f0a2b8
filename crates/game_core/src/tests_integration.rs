use {
    super::*,
    bevy::{state::app::StatesPlugin, time::TimePlugin},
    common::Element,
    enemy::{Archetype, move_enemies},
    std::time::Duration,
};

fn setup_app(phase: GamePhase) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins.build().disable::<TimePlugin>());
    app.add_plugins(StatesPlugin);
    app.insert_resource(Time::<()>::default());
    app.insert_state(phase);

    app.add_message::<StartLevel>();
    app.add_message::<StopLevel>();
    app.add_message::<PauseGame>();
    app.add_message::<ResumeGame>();
    app.add_message::<LevelStarted>();
    app.add_message::<LevelCompleted>();
    app.add_message::<GameOver>();
    app.add_message::<TowerDestroyed>();
    app.add_message::<RetargetEnemies>();
    app.add_message::<PurchaseAlly>();
    app.add_message::<RequestUpgrade>();
    app.add_message::<PurchaseRejected>();
    app.add_message::<UpgradeRejected>();

    app.init_resource::<TileGrid>();
    app.init_resource::<AllyRoster>();
    app.init_resource::<Wallet>();
    app.init_resource::<AllyPrices>();
    app.init_resource::<GameLevel>();
    app.init_resource::<WaveSpawner>();
    app.insert_resource(GameConfig::default());
    app.insert_resource(SpawnConfig::default());

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
    app.add_systems(
        Update,
        (
            (handle_start_level, handle_purchase, handle_upgrade)
                .run_if(in_state(GamePhase::Upgrading)),
            (tick_level_countdown, handle_stop_level, handle_pause)
                .run_if(in_state(GamePhase::Running)),
            handle_resume.run_if(in_state(GamePhase::Paused)),
            (
                handle_game_over.run_if(combat_active),
                finish_drain.run_if(in_state(GamePhase::Draining)),
            )
                .chain()
                .after(SimSet::Cleanup),
        ),
    );
    app
}

fn advance(app: &mut App, secs: f32) {
    app.world_mut()
        .resource_mut::<Time>()
        .advance_by(Duration::from_secs_f32(secs));
    app.update();
}

fn phase(app: &App) -> GamePhase {
    *app.world().resource::<State<GamePhase>>().get()
}

fn request_purchase(app: &mut App, element: Element) {
    app.world_mut()
        .resource_mut::<Messages<PurchaseAlly>>()
        .write(PurchaseAlly { element });
}

#[test]
fn water_purchase_at_exact_price_drains_the_wallet() {
    let mut app = setup_app(GamePhase::Upgrading);
    app.world_mut().resource_mut::<Wallet>().coins = 15;

    request_purchase(&mut app, Element::Water);
    app.update();

    let wallet = app.world().resource::<Wallet>();
    assert_eq!(wallet.coins, 0);
    assert_eq!(wallet.total_upgrades, 1);

    let entity = app.world().resource::<AllyRoster>().0[&Element::Water];
    let ally = app.world().get::<Ally>(entity).unwrap();
    assert_eq!(ally.level, 1);
    // No score yet, so the ladders have not inflated.
    assert_eq!(ally.upgrade_cost, 30);

    // A second water purchase is rejected outright.
    request_purchase(&mut app, Element::Water);
    app.update();

    let allies = app.world_mut().query::<&Ally>().iter(app.world()).count();
    assert_eq!(allies, 1);
    assert_eq!(app.world().resource::<Wallet>().coins, 0);
    assert_eq!(app.world().resource::<Wallet>().total_upgrades, 1);
}

#[test]
fn duplicate_purchase_with_ample_funds_is_still_rejected() {
    let mut app = setup_app(GamePhase::Upgrading);

    request_purchase(&mut app, Element::Water);
    request_purchase(&mut app, Element::Water);
    app.update();

    let allies = app.world_mut().query::<&Ally>().iter(app.world()).count();
    assert_eq!(allies, 1);
    assert_eq!(app.world().resource::<Wallet>().coins, 985);
    assert!(
        !app.world()
            .resource::<Messages<PurchaseRejected>>()
            .is_empty()
    );
}

#[test]
fn underfunded_purchase_changes_nothing() {
    let mut app = setup_app(GamePhase::Upgrading);
    app.world_mut().resource_mut::<Wallet>().coins = 10;

    request_purchase(&mut app, Element::Water);
    app.update();

    let wallet = app.world().resource::<Wallet>();
    assert_eq!(wallet.coins, 10);
    assert_eq!(wallet.total_upgrades, 0);
    assert!(app.world().resource::<AllyRoster>().0.is_empty());
    assert_eq!(
        app.world().resource::<AllyPrices>().first_tier(Element::Water),
        15
    );
    assert!(
        !app.world()
            .resource::<Messages<PurchaseRejected>>()
            .is_empty()
    );
}

#[test]
fn underfunded_upgrade_changes_nothing() {
    let mut app = setup_app(GamePhase::Upgrading);
    let tower = {
        let mut commands = app.world_mut().commands();
        spawn_tower(&mut commands)
    };
    app.update();
    app.world_mut().resource_mut::<Wallet>().coins = 3;

    app.world_mut()
        .resource_mut::<Messages<RequestUpgrade>>()
        .write(RequestUpgrade { target: tower });
    app.update();

    assert_eq!(app.world().get::<Tower>(tower).unwrap().level, 1);
    assert_eq!(app.world().resource::<Wallet>().coins, 3);
    assert_eq!(app.world().resource::<Wallet>().total_upgrades, 0);
    assert!(
        !app.world()
            .resource::<Messages<UpgradeRejected>>()
            .is_empty()
    );
}

#[test]
fn ally_upgrades_inflate_the_ladders_and_tower_upgrades_do_not() {
    let mut app = setup_app(GamePhase::Upgrading);
    let tower = {
        let mut commands = app.world_mut().commands();
        spawn_tower(&mut commands)
    };

    request_purchase(&mut app, Element::Water);
    app.update();
    let ally_entity = app.world().resource::<AllyRoster>().0[&Element::Water];

    // Score earned before the next upgrade drives the markup.
    app.world_mut().resource_mut::<Wallet>().score = 100;
    app.world_mut()
        .resource_mut::<Messages<RequestUpgrade>>()
        .write(RequestUpgrade { target: ally_entity });
    app.update();

    let wallet = app.world().resource::<Wallet>();
    // 1000 - 15 (purchase) - 30 (upgrade out of level 1).
    assert_eq!(wallet.coins, 955);
    assert_eq!(wallet.total_upgrades, 2);

    let ally = app.world().get::<Ally>(ally_entity).unwrap();
    assert_eq!(ally.level, 2);
    // round(100 / 2) = 50 markup on every tier.
    assert_eq!(ally.upgrade_cost, 200);
    let prices = app.world().resource::<AllyPrices>();
    assert_eq!(prices.first_tier(Element::Air), 60);

    // Tower upgrades debit and count, but never touch the ladders.
    app.world_mut()
        .resource_mut::<Messages<RequestUpgrade>>()
        .write(RequestUpgrade { target: tower });
    app.update();

    assert_eq!(app.world().get::<Tower>(tower).unwrap().level, 2);
    let wallet = app.world().resource::<Wallet>();
    assert_eq!(wallet.coins, 950);
    assert_eq!(wallet.total_upgrades, 3);
    let prices = app.world().resource::<AllyPrices>();
    assert_eq!(prices.first_tier(Element::Air), 60);
}

#[test]
fn level_runs_drains_and_reopens_the_shop() {
    let mut app = setup_app(GamePhase::Upgrading);
    let tower = {
        let mut commands = app.world_mut().commands();
        spawn_tower(&mut commands)
    };
    app.update();
    app.world_mut().get_mut::<Health>(tower).unwrap().current = 2.0;

    app.world_mut()
        .resource_mut::<Messages<StartLevel>>()
        .write(StartLevel);
    advance(&mut app, 0.01);
    // The transition lands on the next frame.
    advance(&mut app, 0.01);

    assert_eq!(phase(&app), GamePhase::Running);
    assert_eq!(app.world().resource::<GameLevel>().current, 1);
    assert!(!app.world().resource::<Messages<LevelStarted>>().is_empty());
    assert_eq!(
        app.world()
            .resource::<WaveSpawner>()
            .timer
            .duration()
            .as_secs_f32(),
        3.0
    );

    // Burn through the whole spawn window.
    advance(&mut app, 30.1);
    advance(&mut app, 0.01);
    assert_eq!(phase(&app), GamePhase::Draining);

    // No enemies on the field, so the drain settles immediately.
    advance(&mut app, 0.01);
    assert_eq!(phase(&app), GamePhase::Upgrading);
    assert!(!app.world().resource::<Messages<LevelCompleted>>().is_empty());
    assert_eq!(app.world().get::<Health>(tower).unwrap().current, 10.0);
}

#[test]
fn manual_stop_begins_the_drain() {
    let mut app = setup_app(GamePhase::Running);

    app.world_mut()
        .resource_mut::<Messages<StopLevel>>()
        .write(StopLevel);
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);

    assert_eq!(phase(&app), GamePhase::Draining);
}

#[test]
fn pause_freezes_combat_and_resume_retargets() {
    let mut app = setup_app(GamePhase::Running);
    app.add_systems(Update, move_enemies.run_if(combat_active));

    let enemy = enemy::build_enemy(
        &mut app.world_mut().commands(),
        Vec3::new(0.0, 0.0, arena::ENEMY_BASELINE_Z),
        Vec3::Z,
        Archetype::Regular,
        1,
    );
    advance(&mut app, 0.1);
    let moving_z = app.world().get::<Transform>(enemy).unwrap().translation.z;
    assert!(moving_z > arena::ENEMY_BASELINE_Z);

    app.world_mut()
        .resource_mut::<Messages<PauseGame>>()
        .write(PauseGame);
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);
    assert_eq!(phase(&app), GamePhase::Paused);

    advance(&mut app, 5.0);
    let paused_z = app.world().get::<Transform>(enemy).unwrap().translation.z;
    assert_eq!(paused_z, moving_z);

    app.world_mut()
        .resource_mut::<Messages<ResumeGame>>()
        .write(ResumeGame);
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);
    assert_eq!(phase(&app), GamePhase::Running);
    assert!(
        !app.world()
            .resource::<Messages<RetargetEnemies>>()
            .is_empty()
    );

    advance(&mut app, 0.1);
    let resumed_z = app.world().get::<Transform>(enemy).unwrap().translation.z;
    assert!(resumed_z > paused_z);
}

#[test]
fn tower_destruction_ends_the_session_and_settles_the_highscore() {
    let mut app = setup_app(GamePhase::Running);
    app.insert_resource(Persistence::in_memory());
    {
        let mut wallet = app.world_mut().resource_mut::<Wallet>();
        wallet.score = 42;
        wallet.highscore = 10;
    }

    app.world_mut()
        .resource_mut::<Messages<TowerDestroyed>>()
        .write(TowerDestroyed);
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);

    assert_eq!(phase(&app), GamePhase::Over);
    assert!(!app.world().resource::<Messages<GameOver>>().is_empty());
    assert_eq!(app.world().resource::<Wallet>().highscore, 42);

    let persistence = app.world().resource::<Persistence>();
    assert_eq!(
        persistence.0.get(KEY_HIGHSCORE).unwrap().as_deref(),
        Some("42")
    );
}

#[test]
fn tower_death_on_the_final_drain_frame_still_ends_the_game() {
    let mut app = setup_app(GamePhase::Draining);
    app.insert_resource(Persistence::in_memory());
    app.world_mut().resource_mut::<Wallet>().score = 5;

    // The field is already clear while the destruction notice is still in
    // flight; the drain must yield to the game-over transition.
    app.world_mut()
        .resource_mut::<Messages<TowerDestroyed>>()
        .write(TowerDestroyed);
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);

    assert_eq!(phase(&app), GamePhase::Over);
    assert!(!app.world().resource::<Messages<GameOver>>().is_empty());
    assert!(app.world().resource::<Messages<LevelCompleted>>().is_empty());
    assert_eq!(app.world().resource::<Wallet>().highscore, 5);
}

#[test]
fn final_kill_is_settled_before_the_level_completes() {
    let mut app = setup_app(GamePhase::Draining);
    app.add_message::<common::EnemyKilled>();
    app.add_systems(
        Update,
        (
            enemy::handle_dying_enemies
                .in_set(SimSet::Resolve)
                .run_if(combat_active),
            economy::collect_rewards.in_set(SimSet::Cleanup),
        ),
    );
    app.insert_resource(Persistence::in_memory());
    app.world_mut().resource_mut::<Wallet>().coins = 0;

    // The last enemy of the wave goes down on the same frame the field
    // empties out.
    app.world_mut().spawn((
        Transform::from_xyz(0.0, 0.0, 0.0),
        arena::CollisionShape::cube(0.5),
        enemy::MoveDirection(Vec3::Z),
        Health {
            current: 0.0,
            max: 1.0,
        },
        enemy::Enemy::scaled(Archetype::Regular, 1),
    ));
    advance(&mut app, 0.01);
    advance(&mut app, 0.01);

    assert_eq!(phase(&app), GamePhase::Upgrading);
    let expected_score = Archetype::Regular.score_at(1);
    let completed: Vec<LevelCompleted> = app
        .world_mut()
        .resource_mut::<Messages<LevelCompleted>>()
        .drain()
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].score, expected_score);

    let wallet = app.world().resource::<Wallet>();
    assert_eq!(wallet.score, expected_score);
    assert_eq!(wallet.highscore, expected_score);
    let stored = expected_score.to_string();
    let persistence = app.world().resource::<Persistence>();
    assert_eq!(
        persistence.0.get(KEY_HIGHSCORE).unwrap().as_deref(),
        Some(stored.as_str())
    );
}

#[test]
fn bootstrap_restores_the_profile_and_marks_the_session() {
    let mut app = setup_app(GamePhase::Loading);

    let mut persistence = Persistence::in_memory();
    persistence.0.set(KEY_HIGHSCORE, "77").unwrap();
    app.insert_resource(persistence);
    app.insert_resource(PlayerSession {
        user_id: "173".into(),
        session_hash: "deadbeef".into(),
    });
    app.add_systems(Startup, bootstrap_session);

    app.update();

    assert_eq!(app.world().resource::<Wallet>().highscore, 77);
    let persistence = app.world().resource::<Persistence>();
    assert_eq!(
        persistence.0.get(KEY_ACTIVE_SESSION).unwrap().as_deref(),
        Some("deadbeef")
    );
}
