use {crate::Element, bevy::prelude::*};

// Lifecycle triggers, fired by the presentation layer (or the headless
// driver) and consumed by the orchestrator.

#[derive(Message, Debug, Clone)]
pub struct StartLevel;

#[derive(Message, Debug, Clone)]
pub struct StopLevel;

#[derive(Message, Debug, Clone)]
pub struct PauseGame;

#[derive(Message, Debug, Clone)]
pub struct ResumeGame;

// Lifecycle notifications, published for the presentation layer.

#[derive(Message, Debug, Clone)]
pub struct LevelStarted {
    pub level: u32,
}

#[derive(Message, Debug, Clone)]
pub struct LevelCompleted {
    pub level: u32,
    pub score: u64,
}

#[derive(Message, Debug, Clone)]
pub struct GameOver {
    pub score: u64,
}

/// An enemy went down, either from lethal damage or by reaching a defender.
/// Carries the score and the already-rolled coin drop so the award is
/// settled exactly once, at emission.
#[derive(Message, Debug, Clone)]
pub struct EnemyKilled {
    pub entity: Entity,
    pub score: u64,
    pub coins: u64,
}

#[derive(Message, Debug, Clone)]
pub struct TowerDestroyed;

#[derive(Message, Debug, Clone)]
pub struct AllyDestroyed {
    pub element: Element,
}

/// Straight-line enemy headings are only recomputed on demand: after a
/// resume (defenders may have died while paused) and after an ally death.
#[derive(Message, Debug, Clone)]
pub struct RetargetEnemies;

// Economy requests, valid only during the upgrade phase.

#[derive(Message, Debug, Clone)]
pub struct PurchaseAlly {
    pub element: Element,
}

#[derive(Message, Debug, Clone)]
pub struct RequestUpgrade {
    pub target: Entity,
}

/// Entry point for the external payment backend: grants a purchased item
/// given an opaque identifier. Unknown identifiers are logged and ignored.
#[derive(Message, Debug, Clone)]
pub struct GrantPurchase {
    pub item_id: String,
}

// Rejections, published so the presentation layer can tell the player why a
// request bounced. State is untouched when one of these goes out.

#[derive(Message, Debug, Clone)]
pub struct PurchaseRejected {
    pub element: Element,
    pub reason: String,
}

#[derive(Message, Debug, Clone)]
pub struct UpgradeRejected {
    pub target: Entity,
    pub reason: String,
}
