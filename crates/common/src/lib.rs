use {bevy::prelude::*, serde::Deserialize};

pub mod messages;
pub use messages::*;

/// The fixed-high-rate tick the stat space is expressed in. Per-tick speeds
/// are multiplied by this and by the frame delta so the simulation is
/// frame-rate independent while the stat numbers stay in tick units.
pub const TICK_RATE: f32 = 60.0;

/// Top-level lifecycle of a session. `Upgrading` is the shop phase between
/// waves; `Draining` is the window between a level ending and the shop
/// reopening, while leftover enemies clear out.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, Default, States)]
pub enum GamePhase {
    #[default]
    Loading,
    Upgrading,
    Running,
    Draining,
    Paused,
    Over,
}

/// Intra-frame ordering of the simulation. Damage resolution always happens
/// before the destroyed-entity purge so a unit cannot be scored and missed
/// in the same pass.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimSet {
    /// Spawn scheduling, cooldown ticking, ability casts.
    Schedule,
    /// Movement, displacement animations, occupancy bookkeeping.
    Move,
    /// Bounding-volume collision polling.
    Collide,
    /// Lethality checks, destruction marking.
    Resolve,
    /// Reward settlement and the registry purge of destroyed entities.
    Cleanup,
}

/// Combat happens while a level runs and while it drains; spawning only
/// while it runs.
pub fn combat_active(phase: Res<State<GamePhase>>) -> bool {
    matches!(phase.get(), GamePhase::Running | GamePhase::Draining)
}

#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Default for Health {
    fn default() -> Self {
        Self::full(1.0)
    }
}

impl Health {
    pub fn full(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }
}

/// Terminal marker. Inserted exactly once when health depletes (or an enemy
/// reaches a defender); entities carrying it are ignored by every combat
/// system and swept by the purge.
#[derive(Component, Debug, Default, Clone, Reflect)]
#[reflect(Component)]
pub struct Dead;

/// Marker shared by the tower and all allies; enemies steer toward and
/// collide with anything carrying it.
#[derive(Component, Debug, Default, Clone, Reflect)]
#[reflect(Component)]
pub struct Defender;

/// Transient ballistic carrier. Direction is fixed at fire time (no homing);
/// the projectile dies on its first hit or once it has travelled
/// [`Projectile::MAX_TRAVEL`] from its origin.
#[derive(Component, Debug, Default, Clone, Reflect)]
#[reflect(Component)]
pub struct Projectile {
    pub damage: f32,
    /// Units per tick.
    pub speed: f32,
    pub direction: Vec3,
    pub origin: Vec3,
}

impl Projectile {
    pub const MAX_TRAVEL: f32 = 50.0;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Reflect, Deserialize)]
pub enum Element {
    #[default]
    Water,
    Fire,
    Earth,
    Air,
}

impl Element {
    pub const ALL: [Element; 4] = [Element::Water, Element::Fire, Element::Earth, Element::Air];
}
