use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use pulsewatch::api::{spawn_api_server, ApiState};
use pulsewatch::config::{read_config_file, Config};
use pulsewatch::coordinator::AlertCoordinator;
use pulsewatch::notify::Notifier;
use pulsewatch::probe::ProbeRegistry;
use pulsewatch::scheduler::Scheduler;
use pulsewatch::service::auth::AuthService;
use pulsewatch::service::gc::RetentionSweeper;
use pulsewatch::service::targets::TargetService;
use pulsewatch::silence::SilenceTable;
use pulsewatch::storage::{SqliteStore, Store};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.json")]
    config: String,
}

fn init_tracing(level: &str) {
    let level: LevelFilter = level.parse().unwrap_or(LevelFilter::INFO);
    let filter = filter::Targets::new()
        .with_target("pulsewatch", level)
        .with_target("pulsewatch_server", level)
        .with_default(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if std::path::Path::new(&args.config).exists() {
        read_config_file(&args.config)?
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        config
    };

    init_tracing(&config.log.level);
    info!("starting pulsewatch");

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    // Fatal startup path: store, migrations, admin bootstrap, port bind.
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.database.path, config.database.max_connections).await?,
    );

    let auth = Arc::new(AuthService::new(
        store.clone(),
        &config.auth.secret,
        config.auth.token_expire_hours,
    ));
    auth.bootstrap_admin(&config.auth.admin_password).await?;

    let registry = Arc::new(ProbeRegistry::with_builtins());
    info!("probe registry ready: {:?}", registry.kinds());

    let (scheduler, result_rx, edge_rx) = Scheduler::new(
        registry.clone(),
        store.clone(),
        config.scheduler.alert_threshold,
    );
    let scheduler = Arc::new(scheduler);

    let silences = Arc::new(SilenceTable::new());
    let notifier = Arc::new(Notifier::new(store.clone()));

    let coordinator = AlertCoordinator::new(
        store.clone(),
        notifier.clone(),
        silences.clone(),
        config.notify.send_resolved,
    );
    let coordinator_handle = coordinator.spawn(result_rx, edge_rx);
    info!("alert coordinator started");

    let sweeper = RetentionSweeper::new(store.clone(), config.scheduler.result_retention_days);
    let sweeper_handle = sweeper.spawn();

    let targets = Arc::new(TargetService::new(
        store.clone(),
        registry.clone(),
        scheduler.clone(),
        config.scheduler.default_interval,
        config.scheduler.default_timeout,
    ));

    let loaded = targets.load_enabled().await?;
    info!(loaded, "probe tasks scheduled");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = ApiState {
        store: store.clone(),
        registry,
        scheduler: scheduler.clone(),
        targets,
        auth,
        notifier,
        silences,
    };
    spawn_api_server(addr, state).await?;

    info!("pulsewatch is up, press Ctrl+C to shut down");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    // No new ticks, wait for in-flight probes (10s cap), close the streams,
    // then let the consumers drain until channel close.
    scheduler.stop().await;
    sweeper_handle.abort();
    coordinator_handle.join().await;

    store.close().await?;
    info!("shutdown complete");

    Ok(())
}
