//! CoinDash CLI: drives the chart data pipeline from a terminal.
//!
//! Commands:
//! - `bundle`: load a bundle through the caches and summarize it
//! - `chart`: run a chart session with a text surface, paging history
//! - `order`: print a flattened market-order listing, or a symbol's neighbors
//! - `indicators show|set|reset`: inspect or edit the stored indicator config
//! - `cache status|clear`: report on or empty the persistent stores

mod surface;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use coindash_core::backoff::Backoff;
use coindash_core::chart::ChartAdapter;
use coindash_core::coherency::CoherencyBus;
use coindash_core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use coindash_core::data::DataError;
use coindash_core::domain::{BundleKey, OrderQuery};
use coindash_core::indicator_config::ChartIndicatorConfigV1;
use coindash_core::indicators::{compute_indicators, LastValues};
use coindash_core::session::{ChartContext, LoadOutcome};
use std::path::PathBuf;
use surface::TextSurface;
use tracing::debug;

#[derive(Parser)]
#[command(name = "coindash", about = "CoinDash CLI for the chart data pipeline")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level (RUST_LOG still wins when set).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a bundle (memory → disk → network) and summarize it.
    Bundle {
        /// Market, e.g. spot or futures.
        market: String,
        /// Symbol, e.g. BTCUSDT.
        symbol: String,
        /// Timeframe to request (all timeframes when omitted).
        #[arg(long)]
        tf: Option<String>,
        /// Print the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Render a chart session to the terminal, paging older history.
    Chart {
        market: String,
        symbol: String,
        #[arg(long)]
        tf: String,
        /// History pages to request after the initial load.
        #[arg(long, default_value_t = 1)]
        pages: usize,
        #[arg(long, default_value_t = 80)]
        width: u32,
        #[arg(long, default_value_t = 24)]
        height: u32,
    },
    /// Print the fully paged symbol order for a listing.
    Order {
        market: String,
        #[arg(long, default_value = "all")]
        scope: String,
        #[arg(long, default_value = "24h")]
        window: String,
        #[arg(long, default_value = "volume")]
        sort: String,
        #[arg(long, default_value = "desc")]
        order: String,
        /// Free-text filter.
        #[arg(long)]
        query: Option<String>,
        /// Print only the symbols before and after this one.
        #[arg(long)]
        around: Option<String>,
    },
    /// Indicator configuration commands.
    Indicators {
        #[command(subcommand)]
        action: IndicatorAction,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum IndicatorAction {
    /// Print the stored configuration (defaults when none is stored).
    Show,
    /// Change individual fields; out-of-range values are clamped.
    Set {
        #[arg(long)]
        bollinger: Option<bool>,
        #[arg(long)]
        bb_n: Option<f64>,
        #[arg(long)]
        bb_k: Option<f64>,
        #[arg(long)]
        volume: Option<bool>,
        #[arg(long)]
        rsi: Option<bool>,
        #[arg(long)]
        rsi_period: Option<f64>,
        #[arg(long)]
        macd: Option<bool>,
        #[arg(long)]
        macd_fast: Option<f64>,
        #[arg(long)]
        macd_slow: Option<f64>,
        #[arg(long)]
        macd_signal: Option<f64>,
    },
    /// Forget the stored configuration.
    Reset,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report memory and persistent usage of both caches.
    Status,
    /// Empty both caches.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::from_file(&cli.config)
        .map_err(|e| anyhow!(e))?
        .with_env_overrides();
    debug!(api_base = %config.api_base, data_dir = %config.data_dir.display(), "configuration loaded");
    let bus = CoherencyBus::new();
    let ctx = ChartContext::from_config(&config, &bus).context("building chart context")?;
    let backoff = config.backoff();
    let attempts = config.backoff.max_attempts;

    match cli.command {
        Commands::Bundle {
            market,
            symbol,
            tf,
            json,
        } => run_bundle(&ctx, &backoff, attempts, &market, &symbol, tf.as_deref(), json).await,
        Commands::Chart {
            market,
            symbol,
            tf,
            pages,
            width,
            height,
        } => {
            let size = (width, height);
            run_chart(&ctx, &backoff, attempts, &market, &symbol, &tf, pages, size).await
        }
        Commands::Order {
            market,
            scope,
            window,
            sort,
            order,
            query,
            around,
        } => {
            let q = OrderQuery::new(&market, &scope, &window, &sort, &order)
                .with_query(query.as_deref());
            run_order(&ctx, &backoff, attempts, &q, around.as_deref()).await
        }
        Commands::Indicators { action } => run_indicators(&ctx, action),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&ctx).await,
            CacheAction::Clear => run_cache_clear(&ctx).await,
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        // stdout carries command output
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .init()
}

async fn run_bundle(
    ctx: &ChartContext,
    backoff: &Backoff,
    attempts: u32,
    market: &str,
    symbol: &str,
    tf: Option<&str>,
    json: bool,
) -> Result<()> {
    let key = BundleKey::new(market, symbol, tf);
    let loader = ctx.bundle_loader();
    let loaded = backoff
        .retry(|_| loader.load(&key, None), attempts, DataError::is_transient)
        .await
        .with_context(|| format!("loading bundle {key}"))?;

    let config = ctx.indicator_store().load();
    let bundle = loaded.bundle();
    let frames: Vec<(String, usize, LastValues)> = bundle
        .timeframes()
        .into_iter()
        .map(|frame| {
            let candles = bundle.candles(frame);
            let last = compute_indicators(&candles, &config).last;
            (frame.to_string(), candles.len(), last)
        })
        .collect();

    if json {
        let summary = serde_json::json!({
            "key": key.cache_key(),
            "market": bundle.market,
            "symbol": bundle.symbol,
            "savedAt": loaded.saved_at(),
            "origin": loaded.origin.to_string(),
            "timeframes": frames
                .iter()
                .map(|(frame, n, last)| serde_json::json!({"tf": frame, "candles": n, "last": last}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Bundle:   {key}");
    println!("Saved at: {} (from {})", format_ms(loaded.saved_at()), loaded.origin);
    println!();
    println!(
        "{:<6} {:>8} {:>9} {:>11} {:>11} {:>11}",
        "TF", "Candles", "RSI", "MACD", "BB mid", "BB width"
    );
    println!("{}", "-".repeat(61));
    for (frame, n, last) in &frames {
        let width = match (last.bb_upper, last.bb_lower) {
            (Some(u), Some(l)) => Some(u - l),
            _ => None,
        };
        println!(
            "{:<6} {:>8} {:>9} {:>11} {:>11} {:>11}",
            frame,
            n,
            opt(last.rsi, 2),
            opt(last.macd, 4),
            opt(last.bb_mid, 4),
            opt(width, 4)
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_chart(
    ctx: &ChartContext,
    backoff: &Backoff,
    attempts: u32,
    market: &str,
    symbol: &str,
    tf: &str,
    pages: usize,
    (width, height): (u32, u32),
) -> Result<()> {
    let session = ctx.chart_session();
    let outcome = backoff
        .retry(|_| session.load(market, symbol, tf), attempts, DataError::is_transient)
        .await
        .with_context(|| format!("loading chart {market}/{symbol} {tf}"))?;
    let view = match (outcome, session.view()) {
        (LoadOutcome::Committed { .. }, Some(view)) => view,
        _ => return Err(anyhow!("chart load did not commit")),
    };
    println!("Chart:    {}", view.key);
    println!("Saved at: {} (from {})", format_ms(view.saved_at), view.origin);

    let config = session.indicator_config();
    let mut adapter = ChartAdapter::new(TextSurface::default());
    adapter.mount(width, height);
    adapter.render(&view.candles, &config);

    for _ in 0..pages {
        // the text chart always shows the left edge
        let Some(request) = adapter.on_visible_range(0) else {
            break;
        };
        let outcome = backoff
            .retry(|_| session.load_history(request), attempts, DataError::is_transient)
            .await
            .context("loading older candles")?;
        let added = match outcome {
            LoadOutcome::Committed { candles } => candles,
            LoadOutcome::Superseded | LoadOutcome::NothingToLoad => 0,
        };
        adapter.complete_history(added);
        if added == 0 {
            println!("(no older candles)");
            break;
        }
        if let Some(view) = session.view() {
            adapter.render(&view.candles, &config);
        }
    }

    adapter.teardown();
    session.stop();
    Ok(())
}

async fn run_order(
    ctx: &ChartContext,
    backoff: &Backoff,
    attempts: u32,
    query: &OrderQuery,
    around: Option<&str>,
) -> Result<()> {
    let orders = ctx.market_orders();
    let loaded = backoff
        .retry(|_| orders.load(query), attempts, DataError::is_transient)
        .await
        .with_context(|| format!("loading market order {}", query.cache_key()))?;

    if let Some(symbol) = around {
        match loaded.entry.neighbors(symbol) {
            Some((prev, next)) => println!("{prev} <- {} -> {next}", symbol.trim().to_uppercase()),
            None => println!("{symbol} has no neighbors in {}", query.cache_key()),
        }
        return Ok(());
    }

    println!("Listing:  {}", query.cache_key());
    println!(
        "Saved at: {} (from {})",
        format_ms(loaded.entry.saved_at),
        loaded.origin
    );
    println!("Symbols:  {}", loaded.entry.order.len());
    println!();
    for (i, symbol) in loaded.entry.order.iter().enumerate() {
        println!("{:>5}  {symbol}", i + 1);
    }
    Ok(())
}

fn run_indicators(ctx: &ChartContext, action: IndicatorAction) -> Result<()> {
    let store = ctx.indicator_store();
    match action {
        IndicatorAction::Show => print_config(&store.load()),
        IndicatorAction::Set {
            bollinger,
            bb_n,
            bb_k,
            volume,
            rsi,
            rsi_period,
            macd,
            macd_fast,
            macd_slow,
            macd_signal,
        } => {
            let mut raw = store.load().to_value();
            set_field(&mut raw, &["overlays", "bollinger", "enabled"], bollinger.map(Into::into));
            set_field(&mut raw, &["overlays", "bollinger", "n"], bb_n.map(Into::into));
            set_field(&mut raw, &["overlays", "bollinger", "k"], bb_k.map(Into::into));
            set_field(&mut raw, &["panes", "volume"], volume.map(Into::into));
            set_field(&mut raw, &["panes", "rsi", "enabled"], rsi.map(Into::into));
            set_field(&mut raw, &["panes", "rsi", "period"], rsi_period.map(Into::into));
            set_field(&mut raw, &["panes", "macd", "enabled"], macd.map(Into::into));
            set_field(&mut raw, &["panes", "macd", "fast"], macd_fast.map(Into::into));
            set_field(&mut raw, &["panes", "macd", "slow"], macd_slow.map(Into::into));
            set_field(&mut raw, &["panes", "macd", "signal"], macd_signal.map(Into::into));

            let requested = coindash_core::indicator_config::sanitize(&raw);
            let saved = store
                .save(&requested)
                .with_context(|| format!("writing {}", store.path().display()))?;
            print_config(&saved)
        }
        IndicatorAction::Reset => {
            let removed = store
                .reset()
                .with_context(|| format!("removing {}", store.path().display()))?;
            if removed {
                println!("Indicator configuration reset to defaults.");
            } else {
                println!("No stored indicator configuration.");
            }
            Ok(())
        }
    }
}

/// Overwrite the value at `path` inside nested JSON objects.
fn set_field(root: &mut serde_json::Value, path: &[&str], value: Option<serde_json::Value>) {
    let Some(value) = value else {
        return;
    };
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        match node.get_mut(*key) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Some(map) = node.as_object_mut() {
        map.insert((*last).to_string(), value);
    }
}

fn print_config(config: &ChartIndicatorConfigV1) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

async fn run_cache_status(ctx: &ChartContext) -> Result<()> {
    println!(
        "{:<28} {:>10} {:>12} {:>22}",
        "Store", "Memory", "Persistent", "Newest"
    );
    println!("{}", "-".repeat(75));
    for status in ctx.cache_status().await {
        let memory = format!("{}/{}", status.memory_entries, status.capacity.0);
        let persistent = match status.persistent_rows {
            Some(rows) => format!("{rows}/{}", status.capacity.1),
            None => "unavailable".to_string(),
        };
        let newest = status
            .newest_saved_at
            .map(format_ms)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:>10} {:>12} {:>22}",
            status.store, memory, persistent, newest
        );
    }
    Ok(())
}

async fn run_cache_clear(ctx: &ChartContext) -> Result<()> {
    for (store, removed) in ctx.clear_caches().await {
        match removed {
            Some(n) => println!("{store}: removed {n} rows"),
            None => println!("{store}: unavailable"),
        }
    }
    Ok(())
}

/// Milliseconds since the epoch as UTC `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}
