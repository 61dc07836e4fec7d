//! Hashcash CLI
//!
//! Mint and verify hashcash proof-of-work stamps.
//!
//! # Commands
//!
//! - `mint` - Mint structured tokens for one or more resources
//! - `fastmint` - Stamp an arbitrary prefix with the fastest backend
//! - `check` - Verify a token and record it as spent
//! - `count` - Show the bit strength of tokens
//! - `benchmark` - Measure every collision search backend
//! - `rate` - Quick hash rate measurement
//! - `estimate` - Expected time to mint a given strength
//! - `purge` - Drop expired entries from the double-spend database
//! - `config` - Show or initialize the settings file

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use hashcash::config::{Settings, default_config_path};
use hashcash::engine::{
    BENCH_BITS, CheckError, Engine, MatchKind, MintError, MintRequest, Validity, check,
    count_bits, estimate_seconds, expected_tries, format_duration, mint_many, per_sec,
    sha1_digest, utct,
};
use hashcash::spend::SpendDb;

#[derive(Parser)]
#[command(name = "hashcash")]
#[command(author = "Cyberia")]
#[command(version = "0.1.0")]
#[command(about = "Hashcash proof-of-work stamp minter and verifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase diagnostic output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Settings file (default: <config dir>/hashcash/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint structured tokens, one per resource
    Mint {
        /// Resources to mint for (e.g. recipient addresses)
        #[arg(required = true)]
        resources: Vec<String>,

        /// Bit strength (default: from settings)
        #[arg(short, long)]
        bits: Option<u32>,

        /// Timestamp width in digits: 2, 4, 6, 8, 10 or 12
        #[arg(short = 'w', long, conflicts_with = "validity")]
        width: Option<usize>,

        /// Pick the timestamp width to suit this validity period (seconds)
        #[arg(long)]
        validity: Option<i64>,

        /// Randomize the stamped time by up to this many seconds
        #[arg(short, long)]
        anon: Option<i64>,

        /// Threads for minting several resources (default: number of CPU cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Stamp an opaque prefix using the fastest available backend
    Fastmint {
        /// Text to stamp
        prefix: String,

        /// Bit strength (default: from settings)
        #[arg(short, long)]
        bits: Option<u32>,

        /// Maximum padding regenerations
        #[arg(long)]
        attempts: Option<u32>,

        /// Benchmark backends first instead of picking by capability
        #[arg(long)]
        benchmark: bool,
    },

    /// Verify a token
    Check {
        /// The token to verify
        token: String,

        /// Expected resource (or pattern, see --kind)
        #[arg(short, long)]
        resource: Option<String>,

        /// How to match the resource
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Minimum bit strength
        #[arg(short, long)]
        bits: Option<u32>,

        /// Validity period in seconds (0: never expires)
        #[arg(long)]
        validity: Option<i64>,

        /// Clock skew tolerance in seconds
        #[arg(long)]
        grace: Option<i64>,

        /// Do not consult or update the double-spend database
        #[arg(long)]
        no_spend: bool,

        /// Double-spend database path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print the bit strength of each token
    Count {
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Benchmark every collision search backend
    Benchmark {
        /// Target bits for each backend's test search
        #[arg(short, long, default_value_t = BENCH_BITS)]
        bits: u32,
    },

    /// Measure hash rates quickly
    Rate,

    /// Estimate time to mint
    Estimate {
        /// Bit strength (default: from settings)
        #[arg(short, long)]
        bits: Option<u32>,
    },

    /// Remove expired tokens from the double-spend database
    Purge {
        /// Double-spend database path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print the effective settings
    Config {
        /// Write the effective settings to the settings file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Exact,
    Wildcard,
    Regex,
}

impl From<KindArg> for MatchKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Exact => MatchKind::Exact,
            KindArg::Wildcard => MatchKind::Wildcard,
            KindArg::Regex => MatchKind::Regex,
        }
    }
}

/// Check outcomes that map to their own exit status
#[derive(Error, Debug)]
enum CheckFailure {
    #[error("Token rejected: {0}")]
    Rejected(#[from] CheckError),

    #[error("Token already spent")]
    DoubleSpent,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_settings(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::Mint {
            resources,
            bits,
            width,
            validity,
            anon,
            threads,
        } => cmd_mint(
            &resources,
            build_mint_settings(&settings, bits, width, validity, anon)?,
            threads,
        ),
        Commands::Fastmint {
            prefix,
            bits,
            attempts,
            benchmark,
        } => cmd_fastmint(
            &prefix,
            bits.unwrap_or(settings.mint_bits),
            attempts.unwrap_or(settings.mint.max_attempts),
            benchmark,
        ),
        Commands::Check {
            token,
            resource,
            kind,
            bits,
            validity,
            grace,
            no_spend,
            db,
        } => {
            let mut config = settings.check.clone();
            if let Some(kind) = kind {
                config.kind = kind.into();
            }
            if let Some(bits) = bits {
                config.required_bits = bits;
            }
            if let Some(validity) = validity {
                config.validity_period = validity;
            }
            if let Some(grace) = grace {
                config.grace_period = grace;
            }
            let db = (!no_spend).then(|| db.unwrap_or_else(|| settings.spend_db_path()));
            cmd_check(&token, resource.as_deref(), &config, db.as_deref())
        }
        Commands::Count { tokens } => cmd_count(&tokens, cli.verbose),
        Commands::Benchmark { bits } => cmd_benchmark(bits, cli.verbose),
        Commands::Rate => cmd_rate(),
        Commands::Estimate { bits } => cmd_estimate(bits.unwrap_or(settings.mint_bits)),
        Commands::Purge { db } => cmd_purge(&db.unwrap_or_else(|| settings.spend_db_path())),
        Commands::Config { init } => cmd_config(&settings, cli.config.as_deref(), init),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 1 for ordinary failures and rejected tokens, 2 for double spending,
/// 3 when a backend produced a stamp the reference hash does not confirm
fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(failure) = e.downcast_ref::<CheckFailure>() {
        return match failure {
            CheckFailure::Rejected(_) => 1,
            CheckFailure::DoubleSpent => 2,
        };
    }
    match e.downcast_ref::<MintError>() {
        Some(MintError::BackendIntegrity { .. }) => 3,
        _ => 1,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load_or_default(&default_config_path())?,
    };
    Ok(settings)
}

/// Mint settings with CLI overrides applied
struct MintSettings {
    bits: u32,
    config: hashcash::engine::MintConfig,
}

fn build_mint_settings(
    settings: &Settings,
    bits: Option<u32>,
    width: Option<usize>,
    validity: Option<i64>,
    anon: Option<i64>,
) -> anyhow::Result<MintSettings> {
    let mut config = settings.mint.clone();
    if let Some(width) = width {
        config.time_width = width;
    }
    if let Some(validity) = validity {
        config.time_width = utct::validity_to_width(validity)
            .ok_or_else(|| anyhow::anyhow!("Validity period must not be negative"))?;
    }
    if let Some(anon) = anon {
        config.anon_period = anon;
    }
    Ok(MintSettings {
        bits: bits.unwrap_or(settings.mint_bits),
        config,
    })
}

fn cmd_mint(resources: &[String], settings: MintSettings, threads: Option<usize>) -> anyhow::Result<()> {
    let requests: Vec<MintRequest> = resources
        .iter()
        .map(|resource| MintRequest {
            resource: resource.clone(),
            bits: settings.bits,
        })
        .collect();
    let now = utct::now();

    #[cfg(feature = "parallel")]
    let results = {
        let num_threads = threads.unwrap_or_else(num_cpus::get).min(requests.len()).max(1);
        info!(threads = num_threads, tokens = requests.len(), "minting");
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?
            .install(|| mint_many(now, &requests, &settings.config))
    };
    #[cfg(not(feature = "parallel"))]
    let results = {
        let _ = threads;
        mint_many(now, &requests, &settings.config)
    };

    for result in results {
        let minted = result?;
        info!(
            tries = minted.tries,
            bits = count_bits(&minted.token),
            anon_offset = minted.anon_offset,
            "minted"
        );
        println!("{}", minted.token);
    }

    Ok(())
}

fn cmd_fastmint(prefix: &str, bits: u32, attempts: u32, benchmark: bool) -> anyhow::Result<()> {
    let mut engine = Engine::new();
    if benchmark {
        let report = engine.benchmark_default();
        info!(rate = report.peak_rate, "benchmarked backends");
    }
    info!(backend = engine.selected().name(), bits, "stamping");

    let stamp = engine.fast_mint(bits, prefix, attempts)?;
    info!(bits = stamp.bits, attempts = stamp.attempts, "stamped");
    println!("{}", stamp.token);

    Ok(())
}

fn cmd_check(
    token: &str,
    resource: Option<&str>,
    config: &hashcash::engine::CheckConfig,
    db: Option<&Path>,
) -> anyhow::Result<()> {
    let now = utct::now();
    let checked = check(token, resource, config, now).map_err(CheckFailure::Rejected)?;

    if let Some(path) = db {
        let mut db = SpendDb::open(path)?;
        let expires = match checked.validity {
            Validity::Forever => None,
            Validity::Remaining(_) => {
                Some(
                    checked
                        .token_time
                        .saturating_add(config.validity_period)
                        .saturating_add(config.grace_period),
                )
            }
        };
        if !db.spend(token, expires)? {
            return Err(CheckFailure::DoubleSpent.into());
        }
    }

    println!("Token OK");
    println!("  Resource: {}", checked.token.resource);
    println!("  Bits: {}", checked.bits);
    match checked.validity {
        Validity::Forever => println!("  Valid: forever"),
        Validity::Remaining(seconds) => {
            println!("  Valid for: {}", format_duration(seconds as f64))
        }
    }

    Ok(())
}

fn cmd_count(tokens: &[String], verbose: u8) -> anyhow::Result<()> {
    for token in tokens {
        if verbose > 0 {
            println!(
                "{:3} {} {}",
                count_bits(token),
                hex::encode(sha1_digest(token.as_bytes())),
                token
            );
        } else {
            println!("{}", count_bits(token));
        }
    }
    Ok(())
}

fn cmd_benchmark(bits: u32, verbose: u8) -> anyhow::Result<()> {
    println!("Benchmarking backends at {} bits...\n", bits);

    let mut engine = Engine::new();
    let report = engine.benchmark(bits).verbosity(verbose.saturating_add(1).min(3));
    print!("{}", report);

    if report.best.is_none() {
        anyhow::bail!("No backend passed the benchmark");
    }
    Ok(())
}

fn cmd_rate() -> anyhow::Result<()> {
    let engine = Engine::new();
    let fast = engine.quick_rate();
    let structured = per_sec();

    println!("Results:");
    println!("  {}: {} hashes/sec", engine.selected().name(), fast);
    println!("  Structured tokens: {} hashes/sec", structured);

    Ok(())
}

fn cmd_estimate(bits: u32) -> anyhow::Result<()> {
    let fast = Engine::new().quick_rate();
    let structured = per_sec();

    println!("{} bits: about {:.0} hashes on average", bits, expected_tries(bits));
    println!(
        "  mint:     {}",
        format_duration(estimate_seconds(bits, structured))
    );
    println!(
        "  fastmint: {}",
        format_duration(estimate_seconds(bits, fast))
    );

    Ok(())
}

fn cmd_purge(path: &Path) -> anyhow::Result<()> {
    let mut db = SpendDb::open(path)?;
    let removed = db.purge(utct::now())?;
    println!("Purged {} expired tokens, {} remain", removed, db.len());
    Ok(())
}

fn cmd_config(settings: &Settings, path: Option<&Path>, init: bool) -> anyhow::Result<()> {
    if init {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        settings.save_to_file(&path)?;
        println!("Settings written to {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(settings)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let integrity = anyhow::Error::from(MintError::BackendIntegrity {
            backend: "Portable Standard 1-pipe",
            requested: 20,
            reported: 24,
            verified: 3,
        });
        assert_eq!(exit_code(&integrity), 3);

        let spent = anyhow::Error::from(CheckFailure::DoubleSpent);
        assert_eq!(exit_code(&spent), 2);

        let rejected = anyhow::Error::from(CheckFailure::Rejected(CheckError::Expired));
        assert_eq!(exit_code(&rejected), 1);

        let too_many = anyhow::Error::from(MintError::TooManyTries { attempts: 5 });
        assert_eq!(exit_code(&too_many), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("bad input")), 1);
    }
}
