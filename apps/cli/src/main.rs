#![deny(warnings)]

//! Headless host for the economy engine: runs a real-time game loop with an
//! autoplay policy, saves through a directory store, and prints a summary.

mod autoplay;

use anyhow::{Context, Result};
use balance::Catalog;
use engine::{EconomyEngine, EconomyState, EngineConfig, SystemClock};
use persistence::FileStore;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Args {
    balance: Option<PathBuf>,
    config: Option<PathBuf>,
    save_dir: PathBuf,
    seconds: u64,
    clicks_per_sec: f64,
    reset: bool,
    toggle_sound: bool,
    version: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(argv: I) -> Args {
    let mut args = Args {
        balance: None,
        config: None,
        save_dir: PathBuf::from("./saves"),
        seconds: 10,
        clicks_per_sec: 5.0,
        reset: false,
        toggle_sound: false,
        version: false,
    };
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--balance" => args.balance = it.next().map(PathBuf::from),
            "--config" => args.config = it.next().map(PathBuf::from),
            "--save-dir" => {
                if let Some(dir) = it.next() {
                    args.save_dir = PathBuf::from(dir);
                }
            }
            "--seconds" => {
                if let Some(s) = it.next().and_then(|s| s.parse().ok()) {
                    args.seconds = s;
                }
            }
            "--clicks-per-sec" => {
                if let Some(c) = it.next().and_then(|s| s.parse::<f64>().ok()) {
                    args.clicks_per_sec = c.max(0.0);
                }
            }
            "--reset" => args.reset = true,
            "--toggle-sound" => args.toggle_sound = true,
            "--version" => args.version = true,
            _ => {}
        }
    }
    args
}

#[derive(Debug, Default)]
struct RunReport {
    elapsed: Duration,
    clicks: u64,
    crits: u64,
    purchases: u64,
}

async fn run(engine: &mut EconomyEngine, args: &Args) -> RunReport {
    let mut report = RunReport::default();
    let mut frames = tokio::time::interval(FRAME);
    frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let limit = Duration::from_secs(args.seconds);
    let mut last = started;
    let mut click_budget = 0.0_f64;
    loop {
        tokio::select! {
            _ = frames.tick() => {}
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        engine.apply_passive_tick(dt);
        click_budget += args.clicks_per_sec * dt;
        while click_budget >= 1.0 {
            click_budget -= 1.0;
            report.clicks += 1;
            if engine.apply_manual_gain().is_critical {
                report.crits += 1;
            }
        }
        while let Some(id) = autoplay::next_purchase(engine) {
            if !engine.purchase(id.as_str()) {
                break;
            }
            info!(upgrade = %id, level = engine.level(id.as_str()), "autoplay purchase");
            report.purchases += 1;
        }
        engine.poll_save();

        if now.duration_since(started) >= limit {
            break;
        }
    }
    report.elapsed = started.elapsed();
    report
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args(std::env::args().skip(1));
    if args.version {
        println!(
            "idle-economy {} ({} built {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    info!(?args, "starting CLI");

    let catalog = match &args.balance {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("loading balance {}", path.display()))?,
        None => Catalog::demo().context("loading built-in balance")?,
    };
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let store = FileStore::new(&args.save_dir);
    let mut engine = EconomyEngine::load(catalog, config, Box::new(store), Box::new(SystemClock));

    if args.reset {
        engine.reset_save();
        println!("Save wiped | restart to begin a new game");
        return Ok(());
    }

    if let Some(gain) = engine.take_pending_offline_gain() {
        println!("Welcome back | earned {} while away", gain.round_dp(2));
    }

    let notifications = Rc::new(Cell::new(0u64));
    let counter = notifications.clone();
    engine.subscribe(move |_: &EconomyState| counter.set(counter.get() + 1));

    if args.toggle_sound {
        let on = engine.toggle_sound();
        info!(sound = on, "sound preference changed");
    }

    let report = run(&mut engine, &args).await;
    engine.flush_save();

    let state = engine.state();
    let stats = state.stats();
    println!(
        "Run OK | seconds: {:.1} | clicks: {} | crits: {} | purchases: {} | updates: {}",
        report.elapsed.as_secs_f64(),
        report.clicks,
        report.crits,
        report.purchases,
        notifications.get()
    );
    println!(
        "Economy | resource: {} | earned: {} | per click: {} | per sec: {} | mult: x{} | crit: {}% x{} | sound: {}",
        state.resource().round_dp(2),
        state.total_earned().round_dp(2),
        stats.click_yield,
        stats.passive_rate,
        stats.global_multiplier,
        (stats.crit_chance * rust_decimal::Decimal::ONE_HUNDRED).normalize(),
        stats.crit_multiplier,
        if state.sound_enabled() { "on" } else { "off" }
    );
    let levels: Vec<String> = engine
        .catalog()
        .iter()
        .map(|d| format!("{} {}/{}", d.id, state.level(d.id.as_str()), d.max_level()))
        .collect();
    println!("Upgrades | {}", levels.join(" | "));

    Ok(())
}
