//! Spatial primitives: the axis-aligned bounding volume every combat entity
//! carries, and the tile-occupancy grid the battlefield is laid out on.

use {bevy::prelude::*, rand::Rng};

pub const TILE_SIZE: f32 = 2.0;
/// Columns span x in [-4, 4], rows span z in [-14, 14], both in tile steps.
pub const GRID_HALF_COLS: i32 = 2;
pub const GRID_HALF_ROWS: i32 = 7;
/// Enemies spawn on the far row.
pub const ENEMY_BASELINE_Z: f32 = -(GRID_HALF_ROWS as f32) * TILE_SIZE;
/// Defenders stand on the near row.
pub const DEFENDER_LINE_Z: f32 = GRID_HALF_ROWS as f32 * TILE_SIZE;

/// Half extents of an entity's collision box, fixed per entity kind.
/// The world-space volume is recomputed on demand from the live transform.
#[derive(Component, Debug, Default, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct CollisionShape {
    pub half_extents: Vec3,
}

impl CollisionShape {
    pub fn cube(half: f32) -> Self {
        Self {
            half_extents: Vec3::splat(half),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn of(transform: &Transform, shape: &CollisionShape) -> Self {
        Self {
            min: transform.translation - shape.half_extents,
            max: transform.translation + shape.half_extents,
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

#[derive(Debug, Clone)]
struct Tile {
    center: Vec2,
    /// Held by a stationary defender until it dies.
    reserved: bool,
    /// Dynamic enemy occupancy, updated as units cross cells.
    occupied: bool,
}

/// The battlefield occupancy index. Written only from the single schedule;
/// spawn placement and purchase placement both consult it.
#[derive(Resource, Debug, Clone)]
pub struct TileGrid {
    tiles: Vec<Tile>,
}

impl Default for TileGrid {
    fn default() -> Self {
        let mut tiles = Vec::new();
        for x in -GRID_HALF_COLS..=GRID_HALF_COLS {
            for z in -GRID_HALF_ROWS..=GRID_HALF_ROWS {
                let center = Vec2::new(x as f32 * TILE_SIZE, z as f32 * TILE_SIZE);
                tiles.push(Tile {
                    center,
                    // The tower owns the center of the defender line.
                    reserved: center.x == 0.0 && center.y == DEFENDER_LINE_Z,
                    occupied: false,
                });
            }
        }
        Self { tiles }
    }
}

impl TileGrid {
    /// Picks a random free tile on the given row and reserves it for the
    /// caller. Returns the tile center as (x, z), or `None` when the row
    /// is full.
    pub fn claim_free_tile(&mut self, rng: &mut impl Rng, row_z: f32) -> Option<Vec2> {
        let free: Vec<usize> = self
            .tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.center.y == row_z && !tile.reserved && !tile.occupied)
            .map(|(i, _)| i)
            .collect();

        if free.is_empty() {
            return None;
        }

        let index = free[rng.random_range(0..free.len())];
        self.tiles[index].reserved = true;
        Some(self.tiles[index].center)
    }

    /// Releases the reservation covering the given position, if any.
    pub fn release(&mut self, position: Vec2) {
        if let Some(tile) = self
            .tiles
            .iter_mut()
            .find(|tile| tile.center.distance(position) < TILE_SIZE / 2.0)
        {
            tile.reserved = false;
        }
    }

    /// Hysteresis bookkeeping as enemies cross cells: a cell is occupied
    /// once a unit is within 0.05 of its center and released only after
    /// every unit is farther than 1.0 away.
    pub fn update_occupancy(&mut self, unit_positions: impl Iterator<Item = Vec2> + Clone) {
        for tile in self.tiles.iter_mut() {
            if tile.reserved {
                continue;
            }
            let mut near = false;
            let mut within_release = false;
            for pos in unit_positions.clone() {
                let d = tile.center.distance(pos);
                if d <= 0.05 {
                    near = true;
                }
                if d <= 1.0 {
                    within_release = true;
                }
            }
            if near {
                tile.occupied = true;
            } else if tile.occupied && !within_release {
                tile.occupied = false;
            }
        }
    }

    /// Random tile center on the given row, free or not. Callers re-roll
    /// when the pick turns out blocked.
    pub fn random_tile_in_row(&self, rng: &mut impl Rng, row_z: f32) -> Option<Vec2> {
        let row: Vec<Vec2> = self
            .tiles
            .iter()
            .filter(|tile| tile.center.y == row_z)
            .map(|tile| tile.center)
            .collect();
        if row.is_empty() {
            return None;
        }
        Some(row[rng.random_range(0..row.len())])
    }

    pub fn is_blocked(&self, position: Vec2) -> bool {
        self.tiles
            .iter()
            .find(|tile| tile.center.distance(position) < TILE_SIZE / 2.0)
            .is_none_or(|tile| tile.reserved || tile.occupied)
    }

    pub fn free_tiles_in_row(&self, row_z: f32) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.center.y == row_z && !tile.reserved && !tile.occupied)
            .count()
    }
}
