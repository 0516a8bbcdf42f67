//! SRTM elevation tile store.
//!
//! # File Format
//!
//! Each `.hgt` tile covers 1 degree x 1 degree and holds a 3601 x 3601 grid
//! of big-endian signed 16-bit heights in meters, row-major from the
//! north-west corner (row 0 = northernmost, column 0 = westernmost), no
//! header, no padding: exactly 25,934,402 bytes. The filename encodes the
//! tile's south-west corner: `N48E009.hgt` covers lat 48-49, lon 9-10.
//!
//! Tiles load on first touch and stay cached for the process lifetime; the
//! fleet-wide working set is bounded (Germany needs about 100 tiles). A
//! missing or wrong-sized tile is a fatal error; there is no fallback
//! elevation.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Samples per tile side.
const GRID_SIZE: usize = 3601;
/// Interpolation cells per tile side.
const GRID_INTERVALS: usize = GRID_SIZE - 1;
/// Exact byte size of a valid tile: 3601 * 3601 * 2.
const TILE_BYTES: usize = GRID_SIZE * GRID_SIZE * 2;

/// A decoded SRTM tile. Immutable once loaded.
pub struct SrtmTile {
    /// Row-major heights in meters, row 0 northernmost.
    data: Vec<i16>,
}

impl SrtmTile {
    /// Build a tile from raw grid data (used by tests).
    pub fn new(data: Vec<i16>) -> Self {
        assert_eq!(data.len(), GRID_SIZE * GRID_SIZE, "tile must be 3601x3601");
        Self { data }
    }

    fn decode(bytes: &[u8]) -> Self {
        let data = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Self { data }
    }

    #[inline(always)]
    fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * GRID_SIZE + col] as f64
    }

    /// Interpolated height in meters at fractional tile coordinates, both in
    /// `[0, 1)` measured from the south-west corner.
    ///
    /// The sample converts to grid coordinates (row 0 is the northern edge),
    /// then interpolates barycentrically on the two triangles of the
    /// enclosing cell, split along the anti-diagonal `rf + cf = 1`.
    fn sample(&self, frac_lat: f64, frac_lon: f64) -> f64 {
        let row = (1.0 - frac_lat) * GRID_INTERVALS as f64;
        let col = frac_lon * GRID_INTERVALS as f64;

        let r0 = row.floor() as usize;
        let c0 = col.floor() as usize;
        let r1 = (r0 + 1).min(GRID_INTERVALS);
        let c1 = (c0 + 1).min(GRID_INTERVALS);
        let rf = row - r0 as f64;
        let cf = col - c0 as f64;

        let h00 = self.get(r0, c0);
        let h01 = self.get(r0, c1);
        let h10 = self.get(r1, c0);
        let h11 = self.get(r1, c1);

        if rf + cf <= 1.0 {
            (1.0 - rf - cf) * h00 + cf * h01 + rf * h10
        } else {
            (rf + cf - 1.0) * h11 + (1.0 - rf) * h01 + (1.0 - cf) * h10
        }
    }
}

/// Tile cache keyed by the integer floor of latitude and longitude.
///
/// Read-only after startup; during startup the first touch of each tile
/// performs the only blocking disk read in the system.
pub struct ElevationStore {
    dir: PathBuf,
    tiles: HashMap<(i32, i32), SrtmTile>,
}

impl ElevationStore {
    /// Create a store over a directory of `.hgt` files. Nothing is read
    /// until the first lookup.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            tiles: HashMap::new(),
        }
    }

    /// Build a store from pre-decoded tiles keyed by their south-west corner
    /// (used by tests).
    pub fn from_tiles(tiles: Vec<((i32, i32), SrtmTile)>) -> Self {
        Self {
            dir: PathBuf::new(),
            tiles: tiles.into_iter().collect(),
        }
    }

    /// Elevation in centimeters at a coordinate, rounded half-away-from-zero.
    ///
    /// Points exactly on a tile boundary resolve via the floor rule, so the
    /// choice of tile is deterministic.
    pub fn elevation_cm(&mut self, lat: f64, lon: f64) -> Result<i32> {
        Ok((self.elevation_m(lat, lon)? * 100.0).round() as i32)
    }

    /// Elevation in meters at a coordinate.
    pub fn elevation_m(&mut self, lat: f64, lon: f64) -> Result<f64> {
        let lat_floor = lat.floor();
        let lon_floor = lon.floor();
        let key = (lat_floor as i32, lon_floor as i32);

        let tile = self.tile(key)?;
        Ok(tile.sample(lat - lat_floor, lon - lon_floor))
    }

    /// Number of tiles loaded so far.
    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Drop all cached tiles.
    pub fn clear_cache(&mut self) {
        self.tiles.clear();
    }

    /// Canonical filename for the tile whose south-west corner is
    /// `(lat_floor, lon_floor)`: `{N|S}DD{E|W}DDD.hgt`.
    pub fn tile_filename(lat_floor: i32, lon_floor: i32) -> String {
        format!(
            "{}{:02}{}{:03}.hgt",
            if lat_floor >= 0 { 'N' } else { 'S' },
            lat_floor.abs(),
            if lon_floor >= 0 { 'E' } else { 'W' },
            lon_floor.abs()
        )
    }

    fn tile(&mut self, key: (i32, i32)) -> Result<&SrtmTile> {
        if !self.tiles.contains_key(&key) {
            let tile = self.load_tile(key)?;
            self.tiles.insert(key, tile);
        }
        Ok(&self.tiles[&key])
    }

    fn load_tile(&self, key: (i32, i32)) -> Result<SrtmTile> {
        let filename = Self::tile_filename(key.0, key.1);
        let path = self.dir.join(&filename);

        let bytes = fs::read(&path)
            .with_context(|| format!("SRTM tile not found: {}", path.display()))?;
        if bytes.len() != TILE_BYTES {
            bail!(
                "corrupt SRTM tile {}: {} bytes (expected {})",
                path.display(),
                bytes.len(),
                TILE_BYTES
            );
        }

        tracing::info!("loaded SRTM tile {} ({} MB)", filename, bytes.len() / (1024 * 1024));
        Ok(SrtmTile::decode(&bytes))
    }
}

/// Write a synthetic full-size tile to disk (test support for the end-to-end
/// pipeline; real tiles come from NASA).
pub fn write_test_tile(path: &Path, fill: impl Fn(usize, usize) -> i16) -> Result<()> {
    let mut bytes = Vec::with_capacity(TILE_BYTES);
    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            bytes.extend_from_slice(&fill(row, col).to_be_bytes());
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write tile {}", path.display()))
}
