use {bevy::prelude::*, serde::Deserialize};

/// Base stats per archetype, speed expressed per tick.
#[derive(Debug, Clone, Copy)]
pub struct BaseStats {
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub coin_range: (u64, u64),
    pub half_extent: f32,
}

/// One of the four fixed enemy templates. Fixed at spawn; every stat is a
/// pure function of archetype and wave level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Deserialize)]
pub enum Archetype {
    Regular,
    Fast,
    Fat,
    Strong,
}

impl Archetype {
    pub const ALL: [Archetype; 4] = [
        Archetype::Regular,
        Archetype::Fast,
        Archetype::Fat,
        Archetype::Strong,
    ];

    pub fn base(&self) -> BaseStats {
        match self {
            Archetype::Regular => BaseStats {
                health: 1.0,
                damage: 1.0,
                speed: 0.05,
                coin_range: (0, 1),
                half_extent: 0.5,
            },
            Archetype::Fast => BaseStats {
                health: 1.0,
                damage: 1.0,
                speed: 0.1,
                coin_range: (0, 2),
                half_extent: 0.55,
            },
            Archetype::Fat => BaseStats {
                health: 2.0,
                damage: 1.0,
                speed: 0.05,
                coin_range: (0, 3),
                half_extent: 0.47,
            },
            Archetype::Strong => BaseStats {
                health: 1.0,
                damage: 2.0,
                speed: 0.05,
                coin_range: (0, 2),
                half_extent: 0.5,
            },
        }
    }

    /// Late-game bonus uses floor(level / 4) so health never dips between
    /// adjacent levels.
    pub fn health_at(&self, level: u32) -> f32 {
        let bonus = if level > 4 { (level / 4) as f32 } else { 0.0 };
        self.base().health * level as f32 + bonus
    }

    pub fn damage_at(&self, level: u32) -> f32 {
        ((level as f32 / 2.0) * self.base().damage + 0.5).ceil()
    }

    /// Units per tick.
    pub fn speed_at(&self, level: u32) -> f32 {
        self.base().speed * (0.875 + level as f32 / 8.0)
    }

    pub fn coin_range_at(&self, level: u32) -> (u64, u64) {
        let (min, max) = self.base().coin_range;
        let level = level.max(1) as u64;
        let factor = if level % 2 == 1 { level } else { level / 2 };
        (min + level - 1, (max * factor).max(min + level - 1))
    }

    /// Score reflects how much of a threat the unit was: slow, beefy,
    /// hard-hitting units are worth more.
    pub fn score_at(&self, level: u32) -> u64 {
        let l = level.max(1) as f32;
        let health = self.health_at(level);
        let damage = self.damage_at(level);
        let speed = self.speed_at(level);
        ((l * (1.0 / speed) * (health / l) * (damage / (l / 2.0))) / 14.0).floor() as u64
    }
}
