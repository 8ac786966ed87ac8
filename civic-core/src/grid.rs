//! City grid: the fixed tile classification the population core reads.
//!
//! The grid is built once (parsed from text or generated procedurally) and
//! never mutated afterwards. Zone labels split the map into a 3 × 2 lattice
//! lettered `A B C / D E F`, used for household addresses.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CivicError, Result};

/// A tile coordinate on the city grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TilePos {
    /// Create a tile position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another tile.
    #[must_use]
    pub fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Terrain / zoning classification of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    /// Major road (`R`).
    MajorRoad,
    /// Minor street (`S`).
    Street,
    /// Water (`W`).
    Water,
    /// Park (`P`).
    Park,
    /// Plaza (`L`).
    Plaza,
    /// Residential zone (`H`).
    Residential,
    /// Commercial zone (`C`).
    Commercial,
    /// Office zone (`O`).
    Office,
    /// Industrial zone (`I`).
    Industrial,
    /// Unzoned building lot (`B`).
    Building,
}

impl TileKind {
    /// Parse a legend character.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'R' => Self::MajorRoad,
            'S' => Self::Street,
            'W' => Self::Water,
            'P' => Self::Park,
            'L' => Self::Plaza,
            'H' => Self::Residential,
            'C' => Self::Commercial,
            'O' => Self::Office,
            'I' => Self::Industrial,
            'B' => Self::Building,
            _ => return None,
        })
    }

    /// Legend character for this tile kind.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::MajorRoad => 'R',
            Self::Street => 'S',
            Self::Water => 'W',
            Self::Park => 'P',
            Self::Plaza => 'L',
            Self::Residential => 'H',
            Self::Commercial => 'C',
            Self::Office => 'O',
            Self::Industrial => 'I',
            Self::Building => 'B',
        }
    }

    /// Roads and streets are walkable by commuters.
    #[must_use]
    pub fn is_road(self) -> bool {
        matches!(self, Self::MajorRoad | Self::Street)
    }

    /// Tiles that host jobs.
    #[must_use]
    pub fn is_workplace(self) -> bool {
        matches!(self, Self::Commercial | Self::Office | Self::Industrial)
    }

    /// Human-readable legend name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MajorRoad => "Major road",
            Self::Street => "Street",
            Self::Water => "Water",
            Self::Park => "Park",
            Self::Plaza => "Plaza",
            Self::Residential => "Residential",
            Self::Commercial => "Commercial",
            Self::Office => "Office",
            Self::Industrial => "Industrial",
            Self::Building => "Building",
        }
    }
}

const ZONE_LETTERS: [[char; 3]; 2] = [['A', 'B', 'C'], ['D', 'E', 'F']];

/// The immutable tile map.
#[derive(Debug, Clone)]
pub struct CityGrid {
    width: i32,
    height: i32,
    tiles: Vec<TileKind>,
    column_edges: [i32; 2],
    row_edge: i32,
}

impl CityGrid {
    /// Parse a map from rows of legend characters.
    ///
    /// # Errors
    /// Returns [`CivicError::MapParse`] for empty maps, ragged rows, or
    /// unknown legend characters.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(CivicError::MapParse {
                row: 0,
                reason: "map has no rows".into(),
            });
        };
        let width = first.as_ref().chars().count();
        if width == 0 {
            return Err(CivicError::MapParse {
                row: 0,
                reason: "map has no columns".into(),
            });
        }

        let mut tiles = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let line = line.as_ref();
            if line.chars().count() != width {
                return Err(CivicError::MapParse {
                    row,
                    reason: format!("expected {width} columns, found {}", line.chars().count()),
                });
            }
            for code in line.chars() {
                let kind = TileKind::from_code(code).ok_or_else(|| CivicError::MapParse {
                    row,
                    reason: format!("unknown tile code '{code}'"),
                })?;
                tiles.push(kind);
            }
        }

        Ok(Self::from_tiles(to_i32(width), to_i32(rows.len()), tiles))
    }

    fn from_tiles(width: i32, height: i32, tiles: Vec<TileKind>) -> Self {
        let last_col = (width - 1).max(1);
        #[allow(clippy::cast_possible_truncation)]
        let edge_at = |thirds: i32| {
            let edge = (f64::from(width) * f64::from(thirds) / 3.0).round() as i32;
            edge.clamp(1, last_col)
        };
        let first = edge_at(1);
        let second = edge_at(2).max(first + 1).min(last_col);
        let column_edges = [first, second];
        #[allow(clippy::cast_possible_truncation)]
        let row_edge = if height <= 1 {
            1
        } else {
            ((f64::from(height) / 2.0).round() as i32).clamp(1, height - 1)
        };

        Self {
            width,
            height,
            tiles,
            column_edges,
            row_edge,
        }
    }

    /// Generate the deterministic procedural city.
    ///
    /// Ring roads and a road lattice, diagonal and lattice streets, a handful
    /// of parks bordered by streets, water channels, then 4 × 4 zoning blocks.
    #[must_use]
    pub fn generate(width: i32, height: i32) -> Self {
        let width = width.max(12);
        let height = height.max(12);
        let mut rng = StdRng::seed_from_u64(42);
        let mut grid = vec![vec![TileKind::Building; idx(width)]; idx(height)];
        let set = |grid: &mut Vec<Vec<TileKind>>, x: i32, y: i32, kind: TileKind| {
            grid[idx(y)][idx(x)] = kind;
        };
        let is_lot = |grid: &Vec<Vec<TileKind>>, x: i32, y: i32| grid[idx(y)][idx(x)] == TileKind::Building;

        for x in 0..width {
            set(&mut grid, x, 1, TileKind::MajorRoad);
            set(&mut grid, x, height - 2, TileKind::MajorRoad);
        }
        for y in 0..height {
            set(&mut grid, 1, y, TileKind::MajorRoad);
            set(&mut grid, width - 2, y, TileKind::MajorRoad);
        }
        for y in (4..height - 4).step_by(6) {
            for x in 1..width - 1 {
                set(&mut grid, x, y, TileKind::MajorRoad);
            }
        }
        for x in (4..width - 4).step_by(7) {
            for y in 1..height - 1 {
                set(&mut grid, x, y, TileKind::MajorRoad);
            }
        }

        for y in (2..height - 2).step_by(9) {
            for x in 1..width - 1 {
                if is_lot(&grid, x, y) {
                    set(&mut grid, x, y, TileKind::Street);
                }
            }
        }
        for x in (3..width - 3).step_by(9) {
            for y in 1..height - 1 {
                if is_lot(&grid, x, y) {
                    set(&mut grid, x, y, TileKind::Street);
                }
            }
        }

        for offset in -height..width + height {
            let x = offset + 6;
            let y1 = offset.div_euclid(2) + 5;
            let y2 = (height - 1 - offset).div_euclid(2) + height / 3;
            for y in [y1, y2] {
                if (2..width - 2).contains(&x) && (2..height - 2).contains(&y) && is_lot(&grid, x, y) {
                    set(&mut grid, x, y, TileKind::Street);
                }
            }
        }

        for _ in 0..9 {
            let w = rng.gen_range(2..=4);
            let h = rng.gen_range(2..=4);
            let x0 = rng.gen_range(2..=(width - w - 3).max(2));
            let y0 = rng.gen_range(2..=(height - h - 3).max(2));
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    if is_lot(&grid, x, y) {
                        set(&mut grid, x, y, TileKind::Park);
                    }
                }
            }
            for y in y0 - 1..y0 + h + 1 {
                for x in x0 - 1..x0 + w + 1 {
                    if (0..width).contains(&x) && (0..height).contains(&y) && is_lot(&grid, x, y) {
                        set(&mut grid, x, y, TileKind::Street);
                    }
                }
            }
        }

        for x in (8..width - 8).step_by(12) {
            for y in 2..height - 2 {
                if is_lot(&grid, x, y) {
                    set(&mut grid, x, y, TileKind::Water);
                }
            }
        }

        assign_zones(&mut grid, width, height);

        let tiles = grid.into_iter().flatten().collect();
        Self::from_tiles(width, height, tiles)
    }

    /// Map width in tiles.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Map height in tiles.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Whether `tile` lies inside the map.
    #[must_use]
    pub fn is_within(&self, tile: TilePos) -> bool {
        (0..self.width).contains(&tile.x) && (0..self.height).contains(&tile.y)
    }

    /// Tile kind at `tile`, or `None` outside the map.
    #[must_use]
    pub fn get(&self, tile: TilePos) -> Option<TileKind> {
        if !self.is_within(tile) {
            return None;
        }
        self.tiles.get(idx(tile.y * self.width + tile.x)).copied()
    }

    /// Whether `tile` is a road or street.
    #[must_use]
    pub fn is_road(&self, tile: TilePos) -> bool {
        self.get(tile).is_some_and(TileKind::is_road)
    }

    /// Every tile position in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| TilePos::new(x, y)))
    }

    /// All tiles of `kind`, in row-major order.
    #[must_use]
    pub fn tiles_of(&self, kind: TileKind) -> Vec<TilePos> {
        self.positions().filter(|p| self.get(*p) == Some(kind)).collect()
    }

    /// All walkable tiles, in row-major order.
    #[must_use]
    pub fn road_tiles(&self) -> Vec<TilePos> {
        self.positions().filter(|p| self.is_road(*p)).collect()
    }

    /// Closest road tile to `start` by Manhattan distance (first in
    /// row-major order on ties). Returns `start` when the map has no roads.
    #[must_use]
    pub fn nearest_road_tile(&self, start: TilePos) -> TilePos {
        self.positions()
            .filter(|p| self.is_road(*p))
            .min_by_key(|p| p.manhattan(start))
            .unwrap_or(start)
    }

    /// Zone letter for a coordinate; out-of-range coordinates are clamped.
    #[must_use]
    pub fn zone_label(&self, tile: TilePos) -> char {
        let x = tile.x.clamp(0, self.width - 1);
        let y = tile.y.clamp(0, self.height - 1);
        let row = usize::from(y >= self.row_edge);
        let col = if x < self.column_edges[0] {
            0
        } else if x < self.column_edges[1] {
            1
        } else {
            2
        };
        ZONE_LETTERS[row][col]
    }

    /// Centre of a tile in render space.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tile_center(tile: TilePos, tile_size: f32) -> (f32, f32) {
        (
            tile.x as f32 * tile_size + tile_size / 2.0,
            tile.y as f32 * tile_size + tile_size / 2.0,
        )
    }

    /// Count of tiles per kind, for city metrics.
    #[must_use]
    pub fn kind_counts(&self) -> Vec<(TileKind, usize)> {
        let mut counts: Vec<(TileKind, usize)> = Vec::new();
        for kind in &self.tiles {
            match counts.iter_mut().find(|(k, _)| k == kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((*kind, 1)),
            }
        }
        counts
    }

    /// Total number of tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

fn assign_zones(grid: &mut [Vec<TileKind>], width: i32, height: i32) {
    const BLOCK: i32 = 4;
    const ZONES: [(TileKind, f64); 4] = [
        (TileKind::Residential, 0.42),
        (TileKind::Commercial, 0.22),
        (TileKind::Office, 0.20),
        (TileKind::Industrial, 0.16),
    ];

    for by in (0..height).step_by(idx(BLOCK)) {
        for bx in (0..width).step_by(idx(BLOCK)) {
            let seed = (u64::from(bx.unsigned_abs()) << 32) ^ u64::from(by.unsigned_abs()) ^ 0x00C1_71C0;
            let mut rng = StdRng::seed_from_u64(seed);
            let roll: f64 = rng.gen_range(0.0..1.0);
            let mut acc = 0.0;
            let mut zone = TileKind::Residential;
            for (kind, weight) in ZONES {
                acc += weight;
                if roll < acc {
                    zone = kind;
                    break;
                }
            }

            for y in by..(by + BLOCK).min(height) {
                for x in bx..(bx + BLOCK).min(width) {
                    let cell = &mut grid[idx(y)][idx(x)];
                    if *cell == TileKind::Building {
                        *cell = if rng.gen_bool(0.08) { TileKind::Park } else { zone };
                    }
                }
            }

            if rng.gen_bool(0.12) {
                let cx = (bx + BLOCK / 2).min(width - 1);
                let cy = (by + BLOCK / 2).min(height - 1);
                let cell = &mut grid[idx(cy)][idx(cx)];
                if matches!(
                    cell,
                    TileKind::Residential | TileKind::Commercial | TileKind::Office | TileKind::Industrial
                ) {
                    *cell = TileKind::Plaza;
                }
            }
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn idx(v: i32) -> usize {
    v.max(0) as usize
}

fn to_i32(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CityGrid {
        CityGrid::from_rows(&["RRRRRR", "RHHOCR", "RIWPLR", "RRSSRR"]).expect("valid map")
    }

    #[test]
    fn parses_legend_codes() {
        let grid = small();
        assert_eq!(grid.width(), 6);
        assert_eq!(grid.height(), 4);
        assert_eq!(grid.get(TilePos::new(1, 1)), Some(TileKind::Residential));
        assert_eq!(grid.get(TilePos::new(3, 1)), Some(TileKind::Office));
        assert_eq!(grid.get(TilePos::new(2, 2)), Some(TileKind::Water));
        assert_eq!(grid.get(TilePos::new(6, 0)), None);
        assert!(grid.is_road(TilePos::new(2, 3)));
    }

    #[test]
    fn rejects_ragged_and_unknown_rows() {
        assert!(matches!(
            CityGrid::from_rows(&["RRR", "RR"]),
            Err(CivicError::MapParse { row: 1, .. })
        ));
        assert!(matches!(
            CityGrid::from_rows(&["RXR"]),
            Err(CivicError::MapParse { row: 0, .. })
        ));
        let empty: [&str; 0] = [];
        assert!(CityGrid::from_rows(&empty).is_err());
    }

    #[test]
    fn zone_labels_split_three_by_two() {
        let grid = CityGrid::generate(42, 32);
        assert_eq!(grid.zone_label(TilePos::new(0, 0)), 'A');
        assert_eq!(grid.zone_label(TilePos::new(20, 0)), 'B');
        assert_eq!(grid.zone_label(TilePos::new(41, 0)), 'C');
        assert_eq!(grid.zone_label(TilePos::new(0, 31)), 'D');
        assert_eq!(grid.zone_label(TilePos::new(41, 31)), 'F');
        // Clamped.
        assert_eq!(grid.zone_label(TilePos::new(-5, 100)), 'D');
    }

    #[test]
    fn narrow_maps_still_get_increasing_zone_edges() {
        let grid = CityGrid::from_rows(&["RRR", "RRR"]).expect("valid map");
        let top: String = (0..3).map(|x| grid.zone_label(TilePos::new(x, 0))).collect();
        let bottom: String = (0..3).map(|x| grid.zone_label(TilePos::new(x, 1))).collect();
        assert_eq!(top, "ABC");
        assert_eq!(bottom, "DEF");

        let two = CityGrid::from_rows(&["RR"]).expect("valid map");
        assert_eq!(two.zone_label(TilePos::new(0, 0)), 'A');
        assert_eq!(two.zone_label(TilePos::new(1, 0)), 'C');
    }

    #[test]
    fn generation_is_deterministic_and_zoned() {
        let a = CityGrid::generate(42, 32);
        let b = CityGrid::generate(42, 32);
        assert!(a.positions().all(|p| a.get(p) == b.get(p)));
        assert!(!a.tiles_of(TileKind::Residential).is_empty());
        assert!(!a.road_tiles().is_empty());
        assert!(a.is_road(TilePos::new(1, 1)));
    }

    #[test]
    fn nearest_road_prefers_closest() {
        let grid = small();
        assert_eq!(grid.nearest_road_tile(TilePos::new(1, 1)), TilePos::new(1, 0));
        assert_eq!(grid.nearest_road_tile(TilePos::new(2, 3)), TilePos::new(2, 3));
    }
}
