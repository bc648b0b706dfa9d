//! hitbin command-line interface.
//!
//! Bins HDF5 event files into image containers and provides tools to
//! inspect, concatenate and shuffle them.
#![allow(
    clippy::uninlined_format_args,
    clippy::redundant_closure_for_method_calls,
    clippy::struct_excessive_bools,
    clippy::too_many_lines
)]

use clap::{Args, Parser, Subcommand};

use hitbin_core::config::DataCutConfig;
use hitbin_core::{
    Complib, Compression, GeometryProfile, ProjectionSet, RunConfig, StatsConfig, TimeCutMode,
    TriggerPreset,
};
use hitbin_io::{
    concat, merge_container_stats, shuffle, write_stats_json, ContainerReader, FileBinner,
    GeometrySource, JsonGeometry, StorageOverrides, DEFAULT_SHUFFLE_SEED,
};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    HitbinIo(#[from] hitbin_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] hitbin_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Bins particle-detector hit events into fixed-shape images.
#[derive(Parser)]
#[command(name = "hitbin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Container storage options shared by the tools.
#[derive(Args, Debug, Clone)]
struct StorageArgs {
    /// Chunk size along the row axis (inherited if unset)
    #[arg(long)]
    chunk_rows: Option<usize>,

    /// Compression library: gzip, zlib, lzf or none (inherited if unset)
    #[arg(long)]
    complib: Option<Complib>,

    /// Compression level for gzip
    #[arg(long)]
    complevel: Option<u8>,

    /// Rows copied per block
    #[arg(long, default_value = "1000")]
    block_rows: usize,
}

impl StorageArgs {
    fn overrides(&self) -> Result<StorageOverrides> {
        let compression = match (self.complib, self.complevel) {
            (Some(lib), level) => Some(Compression::new(lib, level)?),
            (None, Some(_)) => {
                return Err(CliError::Usage("--complevel requires --complib".to_string()));
            }
            (None, None) => None,
        };
        Ok(StorageOverrides {
            chunk_rows: self.chunk_rows,
            compression,
            block_rows: self.block_rows,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Bin event files into one image container per projection
    Bin {
        /// Input HDF5 event file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Detector geometry JSON file
        #[arg(short, long)]
        geometry: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Run configuration JSON; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bins per axis as x,y,z,t
        #[arg(long, value_delimiter = ',', num_args = 4)]
        bins: Option<Vec<usize>>,

        /// Geometry profile
        #[arg(long)]
        det_geo: Option<GeometryProfile>,

        /// Projection set: 2d, 3d, xyzt or xyzc
        #[arg(long)]
        projections: Option<ProjectionSet>,

        /// Time cut: none, timeslice_relative or trigger_cluster
        #[arg(long)]
        time_cut: Option<TimeCutMode>,

        /// Trigger window preset: all, tight-1 or tight-2
        #[arg(long)]
        trigger_preset: Option<TriggerPreset>,

        /// Skip events below this energy
        #[arg(long)]
        energy_lower: Option<f64>,

        /// Skip events above this energy
        #[arg(long)]
        energy_upper: Option<f64>,

        /// Probability of dropping an event
        #[arg(long)]
        throw_away_prob: Option<f64>,

        /// Keep only triggered hits
        #[arg(long)]
        triggered_only: bool,

        /// Keep only MC hits
        #[arg(long)]
        mc_hits_only: bool,

        /// Production identifier appended to the metadata
        #[arg(long)]
        prod_ident: Option<i64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Chunk size along the row axis
        #[arg(long)]
        chunk_rows: Option<usize>,

        /// Compression library: gzip, zlib, lzf or none
        #[arg(long)]
        complib: Option<Complib>,

        /// Compression level for gzip
        #[arg(long)]
        complevel: Option<u8>,

        /// Rows buffered before each flush
        #[arg(long)]
        flush_rows: Option<usize>,

        /// Sample bin statistics every N events
        #[arg(long)]
        stats_every: Option<usize>,

        /// Export merged bin statistics to this JSON file
        #[arg(long)]
        stats_json: Option<PathBuf>,

        /// Stop after this many events per file
        #[arg(long)]
        max_events: Option<usize>,

        /// Metadata extractor: neutrino, real_data or random_noise
        #[arg(long)]
        extractor: Option<String>,

        /// Center hit times on the first triggered hit
        #[arg(long)]
        center_time: bool,
    },

    /// Append several containers into one
    Concat {
        /// Input containers
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output container
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Write a container's rows in a seeded random order
    Shuffle {
        /// Input container
        input: PathBuf,

        /// Output container
        #[arg(short, long)]
        output: PathBuf,

        /// Random seed
        #[arg(long, default_value_t = DEFAULT_SHUFFLE_SEED)]
        seed: u64,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Merge the bin statistics of containers and export them as JSON
    Stats {
        /// Input containers
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show information about a container
    Info {
        /// Input container
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Bin {
            input,
            geometry,
            out_dir,
            config,
            bins,
            det_geo,
            projections,
            time_cut,
            trigger_preset,
            energy_lower,
            energy_upper,
            throw_away_prob,
            triggered_only,
            mc_hits_only,
            prod_ident,
            seed,
            chunk_rows,
            complib,
            complevel,
            flush_rows,
            stats_every,
            stats_json,
            max_events,
            extractor,
            center_time,
        } => {
            let mut run = match &config {
                Some(path) => RunConfig::from_file(path)?,
                None => RunConfig::default(),
            };

            if let Some(bins) = bins {
                let n_bins: [usize; 4] = bins
                    .try_into()
                    .map_err(|_| CliError::Usage("--bins takes four values".to_string()))?;
                run = run.with_n_bins(n_bins);
            }
            if let Some(profile) = det_geo {
                run.det_geo = profile;
            }
            if let Some(projections) = projections {
                run = run.with_projections(projections);
            }
            if let Some(mode) = time_cut {
                run.time_cut.mode = mode;
            }
            if let Some(preset) = trigger_preset {
                run.time_cut.preset = preset;
            }
            let data_cut = DataCutConfig {
                energy_lower: energy_lower.or(run.data_cut.energy_lower),
                energy_upper: energy_upper.or(run.data_cut.energy_upper),
                throw_away_prob: throw_away_prob.unwrap_or(run.data_cut.throw_away_prob),
                triggered_only: triggered_only || run.data_cut.triggered_only,
                mc_hits_only: mc_hits_only || run.data_cut.mc_hits_only,
            };
            run = run.with_data_cut(data_cut);
            if let Some(prod_ident) = prod_ident {
                run = run.with_prod_ident(prod_ident);
            }
            if let Some(seed) = seed {
                run = run.with_seed(seed);
            }
            if let Some(rows) = chunk_rows {
                run = run.with_chunk_rows(rows);
            }
            if complib.is_some() || complevel.is_some() {
                let lib = complib.unwrap_or(run.complib);
                run = run.with_compression(lib, complevel);
            }
            if let Some(rows) = flush_rows {
                run = run.with_flush_rows(rows);
            }
            if stats_every.is_some() || stats_json.is_some() {
                let stats = StatsConfig {
                    sample_every: stats_every.or(run.stats.sample_every),
                    export_json: stats_json.or_else(|| run.stats.export_json.clone()),
                };
                run = run.with_stats(stats);
            }
            if let Some(max) = max_events {
                run = run.with_max_events(max);
            }
            if let Some(name) = extractor {
                run = run.with_extractor(name);
            }
            if center_time {
                run = run.with_center_time(true);
            }
            run.validate()?;

            if cli.verbose {
                eprintln!("Configuration: {}", serde_json::to_string_pretty(&run)?);
            }

            let start = Instant::now();
            let geometry = JsonGeometry::new(&geometry).load()?;
            info!("loaded {} modules", geometry.n_modules());
            let binner = FileBinner::new(run, &geometry)?;
            let batch = binner.run_files(&input, &out_dir)?;

            println!(
                "Processed {} files in {:.2}s",
                input.len(),
                start.elapsed().as_secs_f64()
            );
            println!("{}", batch.summary);
            for path in &batch.summary.outputs {
                println!("  {}", path.display());
            }
        }

        Commands::Concat {
            input,
            output,
            storage,
        } => {
            let rows = concat(&input, &output, &storage.overrides()?)?;
            println!("Wrote {} rows to {}", rows, output.display());
        }

        Commands::Shuffle {
            input,
            output,
            seed,
            storage,
        } => {
            let rows = shuffle(&input, &output, seed, &storage.overrides()?)?;
            println!("Wrote {} rows to {}", rows, output.display());
        }

        Commands::Stats { input, output } => {
            let Some(stats) = merge_container_stats(&input)? else {
                return Err(CliError::Usage(
                    "none of the inputs contains bin statistics".to_string(),
                ));
            };
            write_stats_json(&output, &stats)?;
            println!(
                "Merged statistics of {} events ({} sampled) into {}",
                stats.seen(),
                stats.sampled(),
                output.display()
            );
        }

        Commands::Info { input } => {
            let reader = ContainerReader::open(&input)?;
            let info = reader.info();

            println!("File: {}", input.display());
            println!(
                "Projection: {}",
                info.projection.as_deref().unwrap_or("unknown")
            );
            println!("Rows: {}", info.rows);
            println!("Image shape: {:?}", info.image_shape);
            println!("Metadata fields: {}", info.fields.join(", "));
            println!(
                "Compression: {} (level {}), chunk {} rows",
                info.compression.complib(),
                info.compression
                    .level()
                    .map_or_else(|| "-".to_string(), |l| l.to_string()),
                info.chunk_rows
            );
            if let Some(stats) = reader.read_bin_stats()? {
                println!(
                    "Bin statistics: {} fields, {} events seen",
                    stats.fields().len(),
                    stats.seen()
                );
            }
        }
    }

    Ok(())
}
