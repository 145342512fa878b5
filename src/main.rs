use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dedupe_estimator::{
    estimate_with, write_dedupe_map, ChunkStore, EstimateOptions, DEFAULT_TARGET_CHUNK_SIZE,
};

#[derive(Parser)]
#[command(name = "de")]
#[command(about = "Estimate chunk-level deduplication and compression across files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate deduplication across the given files
    Estimate {
        /// Input files, in the order they would enter the store
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write per-file and merged dedupe map images into this directory
        #[arg(short, long)]
        map_dir: Option<PathBuf>,

        /// Target chunk size in bytes (power of two)
        #[arg(long, default_value_t = DEFAULT_TARGET_CHUNK_SIZE)]
        target_chunk_size: usize,
    },

    /// Print the chunk boundaries of a single file
    Chunks {
        file: PathBuf,

        /// Target chunk size in bytes (power of two)
        #[arg(long, default_value_t = DEFAULT_TARGET_CHUNK_SIZE)]
        target_chunk_size: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Estimate {
            files,
            map_dir,
            target_chunk_size,
        } => run_estimate(&files, map_dir.as_deref(), target_chunk_size),
        Commands::Chunks {
            file,
            target_chunk_size,
        } => run_chunks(&file, target_chunk_size),
    }
}

fn run_estimate(
    files: &[PathBuf],
    map_dir: Option<&std::path::Path>,
    target_chunk_size: usize,
) -> Result<()> {
    let options = EstimateOptions {
        target_chunk_size,
        ..Default::default()
    };
    let est = estimate_with(files, &options)?;
    let result = est.result;

    println!("Total size:            {:>12}", human_bytes(result.total_len));
    println!(
        "Chunk size:            {:>12}  ({:.0}% of total)",
        human_bytes(result.chunk_bytes),
        100.0 * result.dedup_ratio()
    );
    println!(
        "Compressed chunk size: {:>12}  ({:.0}% of total)",
        human_bytes(result.compressed_chunk_bytes),
        100.0 * result.compressed_dedup_ratio()
    );

    if let Some(dir) = map_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        for (index, (file, segments)) in files.iter().zip(est.source_segments()).enumerate() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("input-{index}"));
            write_dedupe_map(&segments, dir.join(format!("{index:02}-{name}.png")))?;
        }
        write_dedupe_map(&est.merged.segments(), dir.join("merged.png"))?;
        println!("Dedupe maps written to {}", dir.display());
    }

    Ok(())
}

fn run_chunks(file: &std::path::Path, target_chunk_size: usize) -> Result<()> {
    let store = ChunkStore::from_file(file, target_chunk_size, false)?;

    println!("{:>12}  {:>9}  fingerprint", "offset", "length");
    let mut seen = HashSet::new();
    let mut offset = 0usize;
    for (fingerprint, record) in store.records() {
        let marker = if seen.insert(fingerprint) { "" } else { "  dup" };
        println!("{offset:>12}  {:>9}  {fingerprint:016x}{marker}", record.len);
        offset += record.len;
    }
    println!(
        "{} chunks, {} unique, {} total",
        store.chunk_count(),
        store.unique_chunk_count(),
        human_bytes(store.total_len())
    );

    Ok(())
}

fn human_bytes(n: usize) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
