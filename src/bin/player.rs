use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use market_replay::book::{OrderBook, PriceLevel};
use market_replay::record::{Order, Trade};
use market_replay::simulator::{ReplayHandler, Simulator};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Replay a binary event file and reconstruct the order book")]
struct Args {
    /// Input event file (.bin)
    #[arg(long, short = 'i', env = "EVENT_FILE")]
    input: PathBuf,

    /// Dump top-of-book after each order event
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Number of levels to print when dumping
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Print trades as they are read
    #[arg(long, default_value_t = false)]
    print_trades: bool,

    /// Print order events as they are read
    #[arg(long, default_value_t = false)]
    print_orders: bool,
}

struct Printer {
    args: Args,
    interrupted: Arc<AtomicBool>,
}

impl Printer {
    fn flow(&self) -> ControlFlow<()> {
        if self.interrupted.load(Ordering::Relaxed) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn dump_book(&self, book: &OrderBook) {
        let tb = book.bids().levels().take(self.args.top).collect::<Vec<_>>();
        let ta = book.asks().levels().take(self.args.top).collect::<Vec<_>>();
        println!("top{} bids / asks:", self.args.top);
        for i in 0..self.args.top.min(tb.len().max(ta.len())) {
            let b = tb
                .get(i)
                .map(|l| format!("{i:>3}: {}", level(l)))
                .unwrap_or_else(|| format!("{i:>3}: -"));
            let a = ta.get(i).map(|l| level(l)).unwrap_or_else(|| "-".to_string());
            println!("{} | {}", b, a);
        }
        println!("---");
    }
}

fn level(l: &PriceLevel) -> String {
    format!("{:>10.2} x {:>7} ({:>3})", l.price(), l.total_remaining(), l.len())
}

impl ReplayHandler for Printer {
    fn on_trade(&mut self, trade: &Trade, _book: &OrderBook) -> ControlFlow<()> {
        if self.args.print_trades {
            println!("{} buy=#{} sell=#{}", trade, trade.buy_number, trade.sell_number);
        }
        self.flow()
    }

    fn on_order(&mut self, order: &Order, book: &OrderBook) -> ControlFlow<()> {
        if self.args.print_orders {
            println!("{}", order);
        }
        if self.args.dump {
            self.dump_book(book);
        }
        self.flow()
    }
}

fn main() -> Result<()> {
    let _ = dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("installing Ctrl+C handler")?;

    let mut sim = Simulator::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    eprintln!("Header: {}", sim.header());
    let mut printer = Printer { args, interrupted };
    let stats = sim.run(&mut printer).context("replay")?;

    let book = sim.book();
    let span = stats
        .span()
        .map(|d| format!("{:.3}s", d.as_seconds_f64()))
        .unwrap_or_else(|| "-".to_string());
    eprintln!(
        "Read {} events ({} trades, {} orders) over {}{}. \
         Final book: {} bid levels, {} ask levels, {} resting orders.",
        stats.events(),
        stats.trades,
        stats.orders,
        span,
        if stats.stopped { " (interrupted)" } else { "" },
        book.bids().len(),
        book.asks().len(),
        book.resting_count()
    );
    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        eprintln!(
            "Best bid {:.2} x {} | best ask {:.2} x {}",
            bid.price(),
            bid.total_remaining(),
            ask.price(),
            ask.total_remaining()
        );
    }
    Ok(())
}
