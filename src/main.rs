use cryptopulse::config::Settings;
use cryptopulse::consensus::MultiExchangeMonitor;
use cryptopulse::db::Store;
use cryptopulse::exchange::{BinanceClient, BybitClient, MarketDataSource, OkxClient};
use cryptopulse::format;
use cryptopulse::generator::SignalScanner;
use cryptopulse::notifier::{Broadcaster, LogNotifier, Notifier, TelegramNotifier};
use cryptopulse::quality::rate_idea;
use cryptopulse::strategy::{CrossoverStrategy, SignalStrategy, TrendStrategy};
use cryptopulse::tracker::{AcceptOutcome, SignalTracker};
use cryptopulse::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Duration, Instant};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 CryptoPulse starting");

    let settings = Settings::load()?;
    let store = connect_to_postgres().await;

    let bybit: Arc<dyn MarketDataSource> = Arc::new(BybitClient::new());
    let monitor = Arc::new(MultiExchangeMonitor::new(vec![
        bybit.clone(),
        Arc::new(BinanceClient::new()),
        Arc::new(OkxClient::new()),
    ]));

    let strategy = select_strategy(&settings);
    tracing::info!("📊 Configuration:");
    tracing::info!("  Strategy: {}", strategy.name());
    tracing::info!("  Symbols: {}", settings.symbols.join(", "));
    tracing::info!("  Scan every {}s", settings.scan_interval_secs);
    tracing::info!(
        "  Track every {}s ({}s when idle)",
        settings.track_interval_secs,
        settings.idle_interval_secs
    );

    let scanner = SignalScanner::new(
        bybit.clone(),
        strategy,
        settings.symbols.clone(),
        settings.symbol_delay(),
    );
    let tracker = Arc::new(Mutex::new(SignalTracker::new(bybit, store.clone())));
    let broadcaster = Arc::new(Broadcaster::new(create_notifier()));

    tracing::info!("🔄 Spawning loops...");

    let scan_task = {
        let tracker = tracker.clone();
        let broadcaster = broadcaster.clone();
        let store = store.clone();
        let interval = settings.scan_interval();
        tokio::spawn(async move {
            scan_loop(scanner, monitor, tracker, broadcaster, store, interval).await;
        })
    };

    let track_task = {
        let tracker = tracker.clone();
        let broadcaster = broadcaster.clone();
        let store = store.clone();
        let active = settings.track_interval();
        let idle = settings.idle_interval();
        tokio::spawn(async move {
            track_loop(tracker, broadcaster, store, active, idle).await;
        })
    };

    let sweep_task = {
        let broadcaster = broadcaster.clone();
        let store = store.clone();
        let interval = settings.sweep_interval();
        tokio::spawn(async move {
            sweep_loop(store, broadcaster, interval).await;
        })
    };

    tracing::info!("✅ All loops running. Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = scan_task => {
            tracing::error!("Scan loop exited: {:?}", result);
        }
        result = track_task => {
            tracing::error!("Track loop exited: {:?}", result);
        }
        result = sweep_task => {
            tracing::error!("Sweep loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 CryptoPulse stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cryptopulse=info".into()),
        )
        .init();
}

async fn connect_to_postgres() -> Option<Arc<Store>> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/cryptopulse".to_string());

    match Store::connect(&database_url).await {
        Ok(store) => {
            tracing::info!("Postgres persistence enabled");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing without persistence",
                e
            );
            None
        }
    }
}

fn select_strategy(settings: &Settings) -> Box<dyn SignalStrategy> {
    match settings.strategy.as_str() {
        "trend" => Box::new(TrendStrategy {
            min_quote_volume: settings.min_quote_volume,
            ..TrendStrategy::default()
        }),
        _ => Box::new(CrossoverStrategy::default()),
    }
}

fn create_notifier() -> Arc<dyn Notifier> {
    match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("Telegram delivery enabled");
            Arc::new(TelegramNotifier::new(token))
        }
        _ => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, messages go to the log only");
            Arc::new(LogNotifier)
        }
    }
}

/// Scan the watchlist, validate each fresh idea against the consensus,
/// rate it, hand it to the tracker and broadcast the accepted ones
async fn scan_loop(
    scanner: SignalScanner,
    monitor: Arc<MultiExchangeMonitor>,
    tracker: Arc<Mutex<SignalTracker>>,
    broadcaster: Arc<Broadcaster>,
    store: Option<Arc<Store>>,
    interval: Duration,
) {
    let mut ticker = interval_at(Instant::now(), interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let open_symbols = tracker.lock().await.open_symbols();
        let ideas = scanner.scan(&open_symbols).await;
        if ideas.is_empty() {
            continue;
        }

        let subscribers = match &store {
            Some(store) => store.premium_subscribers().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to load subscribers: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        for idea in ideas {
            let validation = monitor.validate_price(&idea.symbol, idea.entry).await;
            if !validation.valid {
                tracing::warn!(
                    symbol = %idea.symbol,
                    deviation = ?validation.deviation_pct,
                    "entry diverges from consensus, signal downgraded"
                );
            }
            let rating = rate_idea(&idea, Some(&validation));

            match tracker.lock().await.accept(idea.clone()).await {
                Ok(AcceptOutcome::Accepted) => {
                    let sent = broadcaster
                        .broadcast_signal(&idea, &rating, &subscribers)
                        .await;
                    tracing::info!(
                        symbol = %idea.symbol,
                        quality = rating.level.label(),
                        recipients = sent,
                        "signal broadcast"
                    );
                }
                Ok(AcceptOutcome::DuplicateSymbol) => {}
                Err(e) => {
                    tracing::error!(symbol = %idea.symbol, error = %e, "failed to accept idea");
                }
            }
        }
    }
}

/// Poll open ideas against live prices; cadence relaxes when nothing is open
async fn track_loop(
    tracker: Arc<Mutex<SignalTracker>>,
    broadcaster: Arc<Broadcaster>,
    store: Option<Arc<Store>>,
    active: Duration,
    idle: Duration,
) {
    loop {
        // The tracker is locked for the poll only; the scan loop must not
        // wait on subscriber lookups or Telegram round-trips.
        let mut poll_failed = false;
        let (closed, open_count) = {
            let mut tracker = tracker.lock().await;
            let closed = match tracker.poll().await {
                Ok(closed) => closed,
                Err(e) => {
                    tracing::warn!("Price poll failed: {}", e);
                    poll_failed = true;
                    Vec::new()
                }
            };
            (closed, tracker.open_count())
        };

        if !closed.is_empty() {
            let subscribers = match &store {
                Some(store) => store.premium_subscribers().await.unwrap_or_default(),
                None => Vec::new(),
            };
            for close in &closed {
                broadcaster.broadcast_close(close, &subscribers).await;
            }
        }

        // Back off to the idle cadence when there is nothing to watch or
        // the data source is struggling
        let pause = if open_count == 0 || poll_failed {
            idle
        } else {
            active
        };
        tokio::time::sleep(pause).await;
    }
}

/// Hourly housekeeping: expire lapsed subscriptions and log performance
async fn sweep_loop(store: Option<Arc<Store>>, broadcaster: Arc<Broadcaster>, interval: Duration) {
    let Some(store) = store else {
        tracing::info!("No persistence, subscription sweep disabled");
        return;
    };

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match store.expire_lapsed().await {
            Ok(expired) => {
                for user_id in expired {
                    broadcaster
                        .send_direct(
                            user_id,
                            "Your premium subscription has expired. Renew to keep receiving signals.",
                        )
                        .await;
                }
            }
            Err(e) => tracing::warn!("Subscription sweep failed: {}", e),
        }

        match store.signal_stats().await {
            Ok(stats) => tracing::info!("\n{}", format::format_stats(&stats)),
            Err(e) => tracing::warn!("Failed to load signal stats: {}", e),
        }
    }
}
