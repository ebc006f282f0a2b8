//! Currency, score and the inflating ally price tables.

use {
    bevy::{platform::collections::HashMap, prelude::*},
    common::{Element, EnemyKilled, GrantPurchase, SimSet},
    thiserror::Error,
};

pub struct EconomyPlugin;

impl Plugin for EconomyPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Wallet>()
            .init_resource::<AllyPrices>()
            .add_systems(
                Update,
                (
                    // Settles after every kill of the frame has been
                    // published, so level-end bookkeeping never misses the
                    // final drop.
                    collect_rewards.in_set(SimSet::Cleanup),
                    handle_grant_purchase,
                ),
            );
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconomyError {
    #[error("not enough coins: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("a {0:?} ally is already fielded")]
    SlotOccupied(Element),
    #[error("the shop is closed outside the upgrade phase")]
    PhaseClosed,
}

/// Session funds and score. Coins only move through [`Wallet::try_debit`]
/// and the reward/grant systems, so a failed purchase can never leak a
/// partial debit.
#[derive(Resource, Debug)]
pub struct Wallet {
    pub coins: u64,
    pub score: u64,
    pub highscore: u64,
    pub total_upgrades: u64,
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            coins: 1000,
            score: 0,
            highscore: 0,
            total_upgrades: 0,
        }
    }
}

impl Wallet {
    pub fn try_debit(&mut self, cost: u64) -> Result<(), EconomyError> {
        if cost > self.coins {
            return Err(EconomyError::InsufficientFunds {
                needed: cost,
                available: self.coins,
            });
        }
        self.coins -= cost;
        Ok(())
    }
}

/// Per-element upgrade price ladders. Fresh each session; every purchase or
/// upgrade inflates all four ladders in proportion to the score earned so
/// far.
#[derive(Resource, Debug, Clone)]
pub struct AllyPrices(pub HashMap<Element, Vec<u64>>);

impl Default for AllyPrices {
    fn default() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            Element::Air,
            vec![
                10, 20, 100, 200, 1000, 2000, 10000, 20000, 50000, 100000, 1000000, 2000000,
            ],
        );
        tables.insert(
            Element::Water,
            vec![
                15, 30, 150, 300, 1500, 3000, 15000, 30000, 100000, 200000, 1000000, 2000000,
            ],
        );
        tables.insert(
            Element::Earth,
            vec![
                20, 40, 200, 400, 2000, 4000, 20000, 40000, 150000, 300000, 1000000, 2000000,
            ],
        );
        tables.insert(
            Element::Fire,
            vec![
                25, 50, 250, 500, 2500, 5000, 25000, 50000, 200000, 400000, 1000000, 2000000,
            ],
        );
        Self(tables)
    }
}

impl AllyPrices {
    /// The purchase price of a fresh ally of the element.
    pub fn first_tier(&self, element: Element) -> u64 {
        self.cost_at(element, 0)
    }

    /// The price of the upgrade out of `level`, clamped to the last tier.
    pub fn cost_at(&self, element: Element, level: u32) -> u64 {
        let table = &self.0[&element];
        table[(level as usize).min(table.len() - 1)]
    }

    /// Raises every tier of every ladder by the session's score per upgrade.
    pub fn inflate(&mut self, score: u64, total_upgrades: u64) {
        if total_upgrades == 0 {
            return;
        }
        let markup = ((score as f64 / total_upgrades as f64).round()) as u64;
        for table in self.0.values_mut() {
            for price in table.iter_mut() {
                *price += markup;
            }
        }
    }
}

/// Settles every kill published this frame. The coin drop was rolled at
/// emission, so replays or duplicate readers cannot double-pay.
pub fn collect_rewards(mut kills: MessageReader<EnemyKilled>, mut wallet: ResMut<Wallet>) {
    for kill in kills.read() {
        wallet.coins += kill.coins;
        wallet.score += kill.score;
        debug!(
            "Reward settled: +{} coins, +{} score (balance {}, score {})",
            kill.coins, kill.score, wallet.coins, wallet.score
        );
    }
}

/// Entry point for the external payment backend. Unknown identifiers are
/// logged and ignored, never an error back to the caller.
pub fn handle_grant_purchase(
    mut grants: MessageReader<GrantPurchase>,
    mut wallet: ResMut<Wallet>,
) {
    for grant in grants.read() {
        let coins = match grant.item_id.as_str() {
            "coins_small" => 500,
            "coins_medium" => 1500,
            "coins_large" => 5000,
            unknown => {
                warn!("Ignoring grant for unknown item {unknown:?}");
                continue;
            }
        };
        wallet.coins += coins;
        info!("Granted {} coins for {:?}", coins, grant.item_id);
    }
}
