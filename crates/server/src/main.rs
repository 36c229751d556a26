use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use mdraft_core::backend::MalwareScanner;
use mdraft_core::{
    create_resolver, load_config, validate_config, AccountStore, BackendSet, ConversionEngine,
    EngineDeps, FsArtifactStore, IdentityResolver, InputStaging, IntakeValidator,
    SqliteAccountStore, SqliteBatchStore, SqliteJobStore, SqliteQuotaLedger,
};

use mdraft_server::api::create_router;
use mdraft_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let json = std::env::var("MDRAFT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run() -> Result<()> {
    init_logging();

    // Determine config path
    let config_path = std::env::var("MDRAFT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));

    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Stores share one SQLite file
    let db_path = &config.database.path;
    let accounts = Arc::new(
        SqliteAccountStore::new(db_path).context("Failed to create account store")?,
    );
    let quota = Arc::new(
        SqliteQuotaLedger::new(db_path, config.quota.clone())
            .context("Failed to create quota ledger")?,
    );
    let jobs = Arc::new(SqliteJobStore::new(db_path).context("Failed to create job store")?);
    let batches =
        Arc::new(SqliteBatchStore::new(db_path).context("Failed to create batch store")?);
    info!("Stores initialized");

    for seed in &config.accounts {
        accounts
            .upsert(seed.to_request())
            .with_context(|| format!("Failed to seed account '{}'", seed.user_id))?;
    }
    if !config.accounts.is_empty() {
        info!(count = config.accounts.len(), "Seeded accounts from config");
    }

    let artifacts = Arc::new(
        FsArtifactStore::new(
            &config.artifacts.dir,
            Duration::from_secs(config.artifacts.ttl_secs),
        )
        .await
        .context("Failed to create artifact store")?,
    );
    let staging = Arc::new(
        InputStaging::new(&config.artifacts.staging_dir)
            .await
            .context("Failed to create staging directory")?,
    );

    let backends =
        BackendSet::from_config(&config.backends).context("Failed to create backends")?;
    for (backend, result) in backends.validate().await {
        match result {
            Ok(()) => info!(%backend, "Backend ready"),
            Err(e) => warn!(%backend, error = %e, "Backend not usable, jobs will fail"),
        }
    }

    let scanner = config.scanner.enabled.then(|| {
        info!(command = ?config.scanner.command, "Malware scanning enabled");
        MalwareScanner::new(config.scanner.clone())
    });

    let engine = ConversionEngine::new(
        EngineDeps {
            accounts: accounts.clone(),
            quota,
            jobs,
            batches,
            artifacts,
            staging,
            backends,
            validator: Arc::new(IntakeValidator::new(config.intake.clone())),
            scanner,
        },
        config.workers.clone(),
        config.limits.clone(),
    );
    engine.start().await;

    let resolver: Arc<dyn IdentityResolver> =
        Arc::from(create_resolver(&config.auth, accounts));
    info!("Using identity resolver: {}", resolver.method_name());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, resolver, engine.clone()));
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    engine.stop().await;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
