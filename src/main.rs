//! Keccak Reduce CLI
//!
//! Hashing and nonce search from the command line.
//!
//! # Commands
//!
//! - `digest` - Keccak-256 of an input
//! - `reduce` - Reduce an input over a nonce range
//! - `mine` - Search a nonce span in parallel for low digests
//! - `benchmark` - Run performance benchmark
//! - `init-config` - Write a default config file

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use keccak::{Config, HasherFactory, ReduceOptions, VIEW_SIZE};

#[derive(Parser)]
#[command(name = "keccak")]
#[command(version)]
#[command(about = "Keccak-256 hashing and proof-of-work nonce reduction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/keccak/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Keccak-256 of an input
    Digest {
        /// Input text, or hex with --hex
        input: String,

        /// Treat the input as hex
        #[arg(long)]
        hex: bool,
    },

    /// Hash an input once per nonce, the nonce replacing its last 8 bytes
    Reduce {
        /// Input text, or hex with --hex
        input: String,

        /// Treat the input as hex
        #[arg(long)]
        hex: bool,

        /// First nonce
        #[arg(long, default_value = "0")]
        start: u64,

        /// End of the nonce range (exclusive)
        #[arg(long, default_value = "1")]
        end: u64,

        /// Minimum leading zero bits to report (default: from config)
        #[arg(short, long)]
        zeros: Option<u32>,
    },

    /// Search a nonce span across worker threads
    Mine {
        /// Input text, or hex with --hex
        input: String,

        /// Treat the input as hex
        #[arg(long)]
        hex: bool,

        /// Minimum leading zero bits to report (default: from config)
        #[arg(short, long)]
        zeros: Option<u32>,

        /// Number of nonces to try, starting at 0
        #[arg(short, long, default_value = "1000000")]
        span: u64,

        /// Number of threads to use (default: from config, else CPU cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of hashes to compute
        #[arg(short, long, default_value = "100000")]
        count: u64,
    },

    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;

    init_logging(&config, cli.verbose);
    debug!(path = %config_path.display(), "config loaded");

    match cli.command {
        Commands::Digest { input, hex } => cmd_digest(&config, &input, hex).await,
        Commands::Reduce {
            input,
            hex,
            start,
            end,
            zeros,
        } => cmd_reduce(&config, &input, hex, start..end, zeros).await,
        Commands::Mine {
            input,
            hex,
            zeros,
            span,
            threads,
        } => cmd_mine(&config, &input, hex, zeros, span, threads).await,
        Commands::Benchmark { count } => cmd_benchmark(&config, count).await,
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
    }
}

fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_input(input: &str, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    let data = if is_hex {
        hex::decode(input.trim_start_matches("0x")).context("input is not valid hex")?
    } else {
        input.as_bytes().to_vec()
    };

    if data.len() > VIEW_SIZE {
        anyhow::bail!("input is {} bytes, the limit is {}", data.len(), VIEW_SIZE);
    }
    Ok(data)
}

async fn cmd_digest(config: &Config, input: &str, is_hex: bool) -> anyhow::Result<()> {
    let data = parse_input(input, is_hex)?;
    let mut hasher = config.factory()?.create_hasher().await?;

    println!("{}", hex::encode(hasher.digest(&data)?));
    Ok(())
}

async fn cmd_reduce(
    config: &Config,
    input: &str,
    is_hex: bool,
    range: std::ops::Range<u64>,
    zeros: Option<u32>,
) -> anyhow::Result<()> {
    let data = parse_input(input, is_hex)?;
    let zeros = zeros.unwrap_or(config.zeros);
    let mut hasher = config.factory()?.create_hasher().await?;

    info!(start = range.start, end = range.end, zeros, "reducing");

    let last = hasher.reduce(
        &data,
        ReduceOptions::new()
            .range(range)
            .zeros(zeros)
            .callback(|nonce, level, hash| {
                println!("nonce {:>12}  zeros {:>3}  {}", nonce, level, hex::encode(hash));
            }),
    )?;

    println!("{}", hex::encode(last));
    Ok(())
}

async fn cmd_mine(
    config: &Config,
    input: &str,
    is_hex: bool,
    zeros: Option<u32>,
    span: u64,
    threads: Option<usize>,
) -> anyhow::Result<()> {
    let data = Arc::new(parse_input(input, is_hex)?);
    let zeros = zeros.unwrap_or(config.zeros);
    let num_threads = threads.or(config.threads).unwrap_or_else(num_cpus::get).max(1);

    println!("Starting mining...");
    println!("Zeros: {} bits", zeros);
    println!("Span: {} nonces", span);
    println!("Threads: {}", num_threads);

    let factory = config.factory()?;
    let hits: Arc<Mutex<Vec<(u64, u32, String)>>> = Arc::default();
    let start = Instant::now();

    let mut workers = Vec::with_capacity(num_threads);
    for (worker, range) in split_span(span, num_threads).into_iter().enumerate() {
        let mut hasher = factory.create_hasher().await?;
        let data = Arc::clone(&data);
        let hits = Arc::clone(&hits);

        workers.push(tokio::task::spawn_blocking(move || {
            debug!(worker, start = range.start, end = range.end, "worker started");
            hasher.reduce(
                &data,
                ReduceOptions::new()
                    .range(range)
                    .zeros(zeros)
                    .callback(move |nonce, level, hash| {
                        if let Ok(mut hits) = hits.lock() {
                            hits.push((nonce, level, hex::encode(hash)));
                        }
                    }),
            )
        }));
    }

    for worker in workers {
        worker.await??;
    }

    let elapsed = start.elapsed();
    let mut hits = match hits.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(_) => anyhow::bail!("a worker panicked while recording hits"),
    };
    hits.sort_unstable_by_key(|(nonce, _, _)| *nonce);

    println!();
    for (nonce, level, hash) in &hits {
        println!("nonce {:>12}  zeros {:>3}  {}", nonce, level, hash);
    }
    let best = hits
        .iter()
        .max_by_key(|(nonce, level, _)| (*level, std::cmp::Reverse(*nonce)));
    if let Some(best) = best {
        println!("\nBest: nonce {} with {} zero bits", best.0, best.1);
    }

    println!("\nResults:");
    println!("  Hits: {}", hits.len());
    println!("  Time elapsed: {:.2}s", elapsed.as_secs_f64());
    println!(
        "  Hashrate: {:.2} H/s",
        span as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    Ok(())
}

/// Split `0..span` into up to `parts` contiguous ranges
fn split_span(span: u64, parts: usize) -> Vec<std::ops::Range<u64>> {
    let parts = (parts as u64).clamp(1, span.max(1));
    let chunk = span / parts;
    let extra = span % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut start = 0;
    for i in 0..parts {
        let len = chunk + u64::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

async fn cmd_benchmark(config: &Config, count: u64) -> anyhow::Result<()> {
    println!("Running benchmark with {} hashes...", count);

    let factory: HasherFactory = config.factory()?;

    let load = Instant::now();
    let mut hasher = factory.create_hasher().await?;
    let load = load.elapsed();

    // 32-byte prefix plus the nonce slot
    let input = [0x5au8; 40];

    let start = Instant::now();
    hasher.reduce(&input, ReduceOptions::new().range(0..count))?;
    let elapsed = start.elapsed();
    let hashrate = count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    println!("\nResults:");
    println!("  Total hashes: {}", count);
    println!("  Time elapsed: {:.2}s", elapsed.as_secs_f64());
    println!("  Hashrate: {:.2} H/s", hashrate);

    println!("\nModule:");
    println!("  Artifact: {}", factory.artifact().name());
    println!("  Checksum: {}", factory.artifact().checksum());
    println!("  Runtime: {}", factory.loader().runtime().name());
    println!("  Load time: {:.2}ms", load.as_secs_f64() * 1000.0);
    println!("  View size: {} bytes", VIEW_SIZE);

    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Config written to {}", path.display());

    Ok(())
}
