use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use market_replay::convert::{ConvertOptions, DumpPaths, convert};
use market_replay::merge::DuplicatePolicy;
use market_replay::parse::{ParseOptions, SymbolPattern};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "B3 market data converter: trade and order dumps to a binary event file"
)]
struct Args {
    /// Symbol to extract (e.g., PETR4, or WDO% for the front-month mini dollar)
    #[arg(env = "SYMBOL")]
    symbol: String,

    /// Trade dump path
    #[arg(env = "TRADES_PATH")]
    trades: PathBuf,

    /// Buy order dump path
    #[arg(env = "BUYS_PATH")]
    buys: PathBuf,

    /// Sell order dump path
    #[arg(env = "SELLS_PATH")]
    sells: PathBuf,

    /// Output file path (.bin); defaults to SYMBOL_YYYYMMDD.bin
    #[arg(long, short = 'o', env = "OUT_FILE")]
    out: Option<PathBuf>,

    /// Keep events with identical sort keys in input order instead of failing
    #[arg(long, default_value_t = false)]
    allow_duplicates: bool,

    /// Log parsing progress every N lines (0 disables)
    #[arg(long, default_value_t = 50_000)]
    progress_every: u64,
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    // Fail on an unsupported wildcard before touching any file
    let pattern: SymbolPattern = args
        .symbol
        .parse()
        .with_context(|| format!("symbol {:?}", args.symbol))?;
    let paths = DumpPaths {
        trades: args.trades,
        buys: args.buys,
        sells: args.sells,
    };
    let duplicates = if args.allow_duplicates {
        DuplicatePolicy::KeepInputOrder
    } else {
        DuplicatePolicy::Reject
    };
    let options = ConvertOptions {
        parse: ParseOptions {
            progress_every: args.progress_every,
        },
        duplicates,
    };

    let (target, summary) = convert(&paths, &pattern, args.out.as_deref(), &options)
        .with_context(|| format!("converting {} from {:?}", args.symbol, paths.trades))?;
    eprintln!(
        "Wrote {} ({} {}): {} trades, {} orders, {} bytes, crc32={:#010x}",
        target.display(),
        summary.symbol,
        summary.date,
        summary.trades,
        summary.orders,
        summary.bytes,
        summary.crc32
    );
    Ok(())
}
