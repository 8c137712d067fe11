//! Terrastream CLI - procedural terrain streaming.
//!
//! Generate single terrain tiles or planet cells, simulate streaming
//! around a moving viewpoint, and dump the active configuration.

use clap::{Args, Parser, Subcommand, ValueEnum};
use glam::Vec3;
use std::path::{Path, PathBuf};
use std::time::Instant;

use terrastream::export::{export_tile_png, PngExportOptions};
use terrastream::streaming::{CellKey, Instantiator};
use terrastream::terrain::{FlatTerrain, FlatTerrainConfig, PlanetConfig, PlanetTerrain};
use terrastream::CpuBackend;

/// Procedural terrain streaming engine.
#[derive(Parser)]
#[command(name = "terrastream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Seed override.
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON configuration file; missing fields use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one flat terrain tile.
    Tile {
        #[command(flatten)]
        common: CommonArgs,

        /// Tile center x.
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        x: f32,

        /// Tile center z.
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        z: f32,

        /// Output directory for PNG heightmap and alphamaps.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base name for output files.
        #[arg(short, long, default_value = "tile")]
        name: String,
    },
    /// Sample and mesh one planet cell.
    Planet {
        #[command(flatten)]
        common: CommonArgs,

        /// Cell key as three integers.
        #[arg(long, num_args = 3, default_values_t = [4, 0, 0], allow_negative_numbers = true)]
        cell: Vec<i32>,

        /// Samples per axis.
        #[arg(long, default_value = "32")]
        lod: u32,
    },
    /// Simulate streaming while the viewpoint moves along +x.
    Stream {
        #[command(flatten)]
        common: CommonArgs,

        /// Which generator to drive.
        #[arg(short, long, default_value = "flat")]
        world: World,

        /// Number of ticks.
        #[arg(short, long, default_value = "10")]
        ticks: u32,

        /// Viewpoint speed in world units per second.
        #[arg(long, default_value = "20")]
        speed: f32,

        /// Seconds per tick.
        #[arg(long, default_value = "0.5")]
        dt: f32,
    },
    /// Print the active configuration as JSON.
    DumpConfig {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(short, long, default_value = "flat")]
        world: World,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum World {
    /// Heightmapped tiles on a plane.
    Flat,
    /// Voxel planet.
    Planet,
}

/// Hands out sequential ids; accepts every variant name.
#[derive(Default)]
struct CliSpawner {
    next: u64,
}

impl Instantiator for CliSpawner {
    type Handle = u64;

    fn has_variant(&self, _variant: &str) -> bool {
        true
    }

    fn instantiate(&mut self, variant: &str, key: CellKey, position: Vec3) -> u64 {
        self.next += 1;
        log::trace!("Instantiated `{}` #{} for cell {} at {}", variant, self.next, key, position);
        self.next
    }

    fn set_active(&mut self, handle: &u64, active: bool) {
        log::trace!("Handle #{} active: {}", handle, active);
    }

    fn destroy(&mut self, handle: u64) {
        log::trace!("Destroyed handle #{}", handle);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tile {
            common,
            x,
            z,
            output,
            name,
        } => run_tile(&common, Vec3::new(x, 0.0, z), output.as_deref(), &name),
        Commands::Planet { common, cell, lod } => run_planet(&common, &cell, lod),
        Commands::Stream {
            common,
            world,
            ticks,
            speed,
            dt,
        } => run_stream(&common, world, ticks, speed, dt),
        Commands::DumpConfig { common, world } => run_dump(&common, world),
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("Error {}: {}", context, err);
    std::process::exit(1);
}

fn read_config(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| fail("reading configuration", e))
}

fn flat_config(common: &CommonArgs) -> FlatTerrainConfig {
    let config = match &common.config {
        Some(path) => FlatTerrainConfig::from_json(&read_config(path))
            .unwrap_or_else(|e| fail("loading flat configuration", e)),
        None => FlatTerrainConfig::default(),
    };
    match common.seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    }
}

fn planet_config(common: &CommonArgs) -> PlanetConfig {
    let config = match &common.config {
        Some(path) => PlanetConfig::from_json(&read_config(path))
            .unwrap_or_else(|e| fail("loading planet configuration", e)),
        None => PlanetConfig::default(),
    };
    match common.seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    }
}

fn flat_terrain(common: &CommonArgs) -> FlatTerrain<CpuBackend, CliSpawner> {
    FlatTerrain::new(flat_config(common), CpuBackend::new(), CliSpawner::default())
        .unwrap_or_else(|e| fail("creating flat terrain", e))
}

fn planet_terrain(common: &CommonArgs) -> PlanetTerrain<CpuBackend, CliSpawner> {
    PlanetTerrain::new(planet_config(common), CpuBackend::new(), CliSpawner::default())
        .unwrap_or_else(|e| fail("creating planet terrain", e))
}

fn run_tile(common: &CommonArgs, center: Vec3, output: Option<&Path>, name: &str) {
    let mut terrain = flat_terrain(common);
    println!("Terrastream - Flat Tile");
    println!("=======================");
    println!("Seed: {}", terrain.seed());
    println!("Center: {}", center);

    let start = Instant::now();
    let tile = terrain
        .generate_tile(center)
        .unwrap_or_else(|e| fail("generating tile", e));
    println!("Generated in {:.2?}", start.elapsed());

    let (min_h, max_h) = tile.heights.height_range();
    println!(
        "Heightmap: {}x{}, range [{:.4}, {:.4}]",
        tile.heights.size(),
        tile.heights.size(),
        min_h,
        max_h
    );
    let texels = tile.alphamaps.size() * tile.alphamaps.size();
    let worst = (0..tile.alphamaps.size())
        .flat_map(|y| (0..tile.alphamaps.size()).map(move |x| (x, y)))
        .map(|(x, y)| (tile.alphamaps.texel(x, y).iter().sum::<f32>() - 1.0).abs())
        .fold(0.0f32, f32::max);
    println!(
        "Alphamaps: {} texels x {} layers, max |sum - 1| = {:.2e}",
        texels,
        tile.alphamaps.layers(),
        worst
    );
    if tile.is_dirty() {
        println!("Warning: tile data is dirty (see log for mismatches)");
    }

    if let Some(dir) = output {
        let options = if max_h > min_h {
            PngExportOptions::auto_range(&tile.heights)
        } else {
            PngExportOptions::default()
        };
        let written = export_tile_png(&tile, dir, name, &options)
            .unwrap_or_else(|e| fail("exporting PNG", e));
        println!("Exported {} PNG files to {}", written, dir.display());
    }
}

fn run_planet(common: &CommonArgs, cell: &[i32], lod: u32) {
    let mut terrain = planet_terrain(common);
    let key = match cell {
        [x, y, z] => CellKey::new(*x, *y, *z),
        _ => fail("parsing cell", "expected three integers"),
    };
    println!("Terrastream - Planet Cell");
    println!("=========================");
    println!("Seed: {}", terrain.seed());
    println!("Cell: {} at {}", key, terrain.grid().position_of(key));
    println!("LOD: {}", lod);

    let start = Instant::now();
    let mesh = terrain
        .build_cell_mesh(key, lod)
        .unwrap_or_else(|e| fail("meshing cell", e));
    println!("Meshed in {:.2?}", start.elapsed());
    println!("Triangles: {}", mesh.triangle_count);
    println!(
        "Sub-meshes: {} (vertex cap {})",
        mesh.submeshes.len(),
        terrain.config().budget.vertex_cap
    );
    for (i, sub) in mesh.submeshes.iter().enumerate() {
        if let Some((lo, hi)) = sub.bounds() {
            println!("  [{}] {} triangles, bounds {} .. {}", i, sub.triangle_count(), lo, hi);
        }
    }
    if mesh.dirty {
        println!("Warning: mesh is dirty (see log for mismatches)");
    }
}

fn run_stream(common: &CommonArgs, world: World, ticks: u32, speed: f32, dt: f32) {
    println!("Terrastream - Streaming Simulation");
    println!("==================================");
    let start = Instant::now();
    match world {
        World::Flat => {
            let mut terrain = flat_terrain(common);
            println!("Seed: {}", terrain.seed());
            for tick in 0..ticks {
                let tracked = Vec3::new(tick as f32 * speed * dt, 0.0, 0.0);
                let report = terrain
                    .tick(dt, tracked)
                    .unwrap_or_else(|e| fail("ticking flat terrain", e));
                println!(
                    "  [{:>3}] center {} | +{} spawned, {} reactivated, {} hidden, {} destroyed, {} deferred | {} tiles",
                    tick,
                    report.center,
                    report.spawned.len(),
                    report.reactivated.len(),
                    report.hidden.len(),
                    report.destroyed.len(),
                    report.deferred.len(),
                    terrain.tile_count()
                );
            }
        }
        World::Planet => {
            let mut terrain = planet_terrain(common);
            println!("Seed: {}", terrain.seed());
            for tick in 0..ticks {
                let tracked = Vec3::new(tick as f32 * speed * dt, 0.0, 0.0);
                let report = terrain
                    .tick(dt, tracked)
                    .unwrap_or_else(|e| fail("ticking planet terrain", e));
                println!(
                    "  [{:>3}] center {} | +{} spawned, {} hidden, {} destroyed | {} remeshed, {} pending",
                    tick,
                    report.grid.center,
                    report.grid.spawned.len(),
                    report.grid.hidden.len(),
                    report.grid.destroyed.len(),
                    report.remeshed.len(),
                    report.pending.len()
                );
            }
        }
    }
    println!("Done in {:.2?}", start.elapsed());
}

fn run_dump(common: &CommonArgs, world: World) {
    let dump = match world {
        World::Flat => flat_terrain(common).dump(),
        World::Planet => planet_terrain(common).dump(),
    };
    let json = dump
        .to_json()
        .unwrap_or_else(|e| fail("serializing configuration", e));
    println!("{}", json);
}
