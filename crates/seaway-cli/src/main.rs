//! Seaway command line: query a running server or work with local water data.

mod client;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use client::SeawayClient;
use seaway_core::source::raster::write_tile;
use seaway_core::source::PolygonIndex;
use seaway_core::{BoundingBox, GeoPoint, RasterTile, TileId, WaterClassification};

/// Marine route planning tools
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seaway Server URL
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a route between two points
    Route {
        #[arg(long, allow_hyphen_values = true)]
        start_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        start_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        end_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        end_lon: f64,
        /// Per-tier search budget (server default when omitted)
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Print the raw JSON waypoints
        #[arg(long)]
        json: bool,
    },
    /// Classify a single point as ocean, lake or land
    Classify {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Ask the server to load water data for a box
    Preload {
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,
    },
    /// Show the server's worker status
    Status,
    /// Summarize a local shapefile or raster tile
    Inspect {
        /// Polygon shapefile (.shp with its .shx beside it)
        #[arg(long, conflicts_with = "tile")]
        shp: Option<PathBuf>,
        /// Raster tile (.wtile)
        #[arg(long)]
        tile: Option<PathBuf>,
        /// Optional point to test, as "lat,lon"
        #[arg(long, allow_hyphen_values = true)]
        point: Option<String>,
    },
    /// Write a 1x1 degree raster tile
    MakeTile {
        /// South-west corner latitude of the tile
        #[arg(long, allow_hyphen_values = true)]
        lat: i32,
        /// South-west corner longitude of the tile
        #[arg(long, allow_hyphen_values = true)]
        lon: i32,
        /// Output directory
        #[arg(long)]
        out: PathBuf,
        /// Cells per side
        #[arg(long, default_value_t = 1200)]
        size: usize,
        /// Fill every cell with this class
        #[arg(long, value_enum, conflicts_with = "ocean_shp")]
        fill: Option<Fill>,
        /// Rasterize an ocean polygon shapefile; cells outside it are land
        #[arg(long)]
        ocean_shp: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fill {
    Ocean,
    Lake,
    Land,
}

impl From<Fill> for WaterClassification {
    fn from(fill: Fill) -> Self {
        match fill {
            Fill::Ocean => WaterClassification::Ocean,
            Fill::Lake => WaterClassification::Lake,
            Fill::Land => WaterClassification::Land,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let client = SeawayClient::new(&args.server);

    match args.command {
        Command::Route {
            start_lat,
            start_lon,
            end_lat,
            end_lon,
            max_iterations,
            json,
        } => {
            let start = GeoPoint::new(start_lat, start_lon);
            let end = GeoPoint::new(end_lat, end_lon);
            let route = client.route(start, end, max_iterations)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&route.waypoints)?);
                return Ok(());
            }
            match route.failure_reason {
                None => println!(
                    "Route OK: {} waypoints, {:.2} nm",
                    route.waypoint_count, route.distance
                ),
                Some(reason) => println!(
                    "Route FAILED ({:?}): direct line {:.2} nm, crosses land: {}",
                    reason, route.distance, route.crosses_land
                ),
            }
            for (i, point) in route.waypoints.iter().enumerate() {
                println!("  [{:2}] ({:.6}, {:.6})", i, point.lat, point.lon);
            }
            if !route.success {
                std::process::exit(2);
            }
        }
        Command::Classify { lat, lon } => {
            let answer = client.classify(GeoPoint::new(lat, lon))?;
            println!(
                "({:.6}, {:.6}) -> {:?} (water: {})",
                answer.lat, answer.lon, answer.classification, answer.is_water
            );
        }
        Command::Preload {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        } => {
            let bounds = BoundingBox::new(min_lat, min_lon, max_lat, max_lon);
            let loaded = client.preload(bounds)?;
            println!("Loaded {} new units", loaded);
        }
        Command::Status => {
            let status = client.worker_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Inspect { shp, tile, point } => {
            let point = point.as_deref().map(parse_point).transpose()?;
            match (shp, tile) {
                (Some(shp), _) => inspect_shapefile(shp, point)?,
                (None, Some(tile)) => inspect_tile(tile, point)?,
                (None, None) => bail!("Pass --shp or --tile"),
            }
        }
        Command::MakeTile {
            lat,
            lon,
            out,
            size,
            fill,
            ocean_shp,
        } => make_tile(TileId { lat, lon }, out, size, fill, ocean_shp)?,
    }

    Ok(())
}

fn parse_point(raw: &str) -> Result<GeoPoint> {
    let (lat, lon) = raw
        .split_once(',')
        .with_context(|| format!("Expected \"lat,lon\", got '{}'", raw))?;
    let lat: f64 = lat.trim().parse().context("Invalid latitude")?;
    let lon: f64 = lon.trim().parse().context("Invalid longitude")?;
    Ok(GeoPoint::new(lat, lon))
}

fn inspect_shapefile(path: PathBuf, point: Option<GeoPoint>) -> Result<()> {
    let index = PolygonIndex::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    println!("Shapefile: {}", index.path().display());
    println!("  Polygons: {}", index.len());
    if let Some(point) = point {
        let candidates = index.candidates(point);
        let inside = index.contains(point)?;
        println!(
            "  ({:.6}, {:.6}): {} bbox candidates, inside: {}",
            point.lat,
            point.lon,
            candidates.len(),
            inside
        );
    }
    Ok(())
}

fn inspect_tile(path: PathBuf, point: Option<GeoPoint>) -> Result<()> {
    let tile = RasterTile::read(&path)?;
    let (rows, cols) = tile.dimensions();
    let (lat_step, lon_step) = tile.resolution_deg();
    let bounds = tile.bounds();
    println!("Tile: {}", path.display());
    println!(
        "  Bounds: ({}, {}) .. ({}, {})",
        bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon
    );
    println!("  Cells: {}x{} ({:.6} x {:.6} deg)", rows, cols, lat_step, lon_step);

    let mut counts = [0usize; 3];
    for &code in tile.cells() {
        counts[WaterClassification::from_code(code).code() as usize] += 1;
    }
    let total = tile.cells().len().max(1) as f64;
    for class in [
        WaterClassification::Ocean,
        WaterClassification::Lake,
        WaterClassification::Land,
    ] {
        let count = counts[class.code() as usize];
        println!(
            "  {:?}: {} ({:.1}%)",
            class,
            count,
            100.0 * count as f64 / total
        );
    }
    if let Some(point) = point {
        if !bounds.contains(&point) {
            println!("  ({:.6}, {:.6}) is outside this tile", point.lat, point.lon);
        } else {
            println!(
                "  ({:.6}, {:.6}) -> {:?}",
                point.lat,
                point.lon,
                tile.classify(point)
            );
        }
    }
    Ok(())
}

fn make_tile(
    id: TileId,
    out: PathBuf,
    size: usize,
    fill: Option<Fill>,
    ocean_shp: Option<PathBuf>,
) -> Result<()> {
    if !(-90..90).contains(&id.lat) || !(-180..180).contains(&id.lon) {
        bail!("Tile corner ({}, {}) is out of range", id.lat, id.lon);
    }
    if size == 0 {
        bail!("--size must be at least 1");
    }
    std::fs::create_dir_all(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let tile = match (fill, ocean_shp) {
        (Some(fill), _) => {
            let class = WaterClassification::from(fill);
            RasterTile::from_fn(id, size, size, |_| class)
        }
        (None, Some(shp)) => {
            let index = PolygonIndex::open(&shp)
                .with_context(|| format!("Failed to open {}", shp.display()))?;
            let mut errors = 0usize;
            let tile = RasterTile::from_fn(id, size, size, |point| match index.contains(point) {
                Ok(true) => WaterClassification::Ocean,
                Ok(false) => WaterClassification::Land,
                Err(_) => {
                    errors += 1;
                    WaterClassification::Land
                }
            });
            if errors > 0 {
                eprintln!("Warning: {} cells could not be read and were written as land", errors);
            }
            tile
        }
        (None, None) => bail!("Pass --fill or --ocean-shp"),
    };

    let path = write_tile(&out, id, &tile)?;
    println!("Wrote {} ({}x{} cells)", path.display(), size, size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lon_pairs() {
        let point = parse_point("47.6, -122.33").unwrap();
        assert_eq!(point, GeoPoint::new(47.6, -122.33));
        assert!(parse_point("47.6").is_err());
        assert!(parse_point("north,west").is_err());
    }

    #[test]
    fn cli_accepts_negative_coordinates() {
        let args = Args::try_parse_from([
            "seaway", "classify", "--lat", "-33.9", "--lon", "151.2",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Classify { lat, .. } if lat == -33.9));
        assert_eq!(args.server, "http://localhost:3000");
    }
}
