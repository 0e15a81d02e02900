use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use server::broadcast::Broadcaster;
use server::config::Config;
use server::network::{self, AppState};
use server::state::StateManager;
use server::store::{spawn_persister, DurableStore};

#[derive(Parser)]
#[command(about = "Authoritative capture-the-point game server")]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Durable state file location
    #[arg(long)]
    state_file: Option<std::path::PathBuf>,

    /// Admin PIN (generated randomly when omitted)
    #[arg(long)]
    admin_pin: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = Arc::new(Config::load(
        args.host,
        args.port,
        args.state_file,
        args.admin_pin,
    ));
    info!("Admin PIN: {}", config.admin_pin);

    let store = DurableStore::new(&config.state_file);
    let restored = store.load();
    let persist = spawn_persister(store, config.save_debounce);

    let broadcaster = Broadcaster::new();
    let manager = Arc::new(Mutex::new(StateManager::new(
        config.clone(),
        persist,
        broadcaster.clone(),
        restored,
    )));

    // Scoring clock: one point award pass per second while a game is
    // running.
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.lock().await.tick_scores();
            }
        });
    }

    // Sync tick: periodic full-state push so clients converge even if
    // they missed incremental messages.
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(shared::SYNC_TICK_MS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.lock().await.broadcast_state();
            }
        });
    }

    let app = network::router(AppState {
        manager,
        broadcaster,
        config: config.clone(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
