use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maintenance_api::auth::Registration;
use maintenance_api::cli::{self, Commands, UserCommands};
use maintenance_api::config::{self, Config};
use maintenance_api::store::memory::MemoryStore;
use maintenance_api::store::postgres::PgStore;
use maintenance_api::store::{Store, UserStore};
use maintenance_api::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` must be loaded before the subscriber reads RUST_LOG.
    let cfg = config::load();
    init_tracing();
    let cfg = cfg?;
    if cfg.uses_placeholder_secret() {
        tracing::warn!("SECRET_KEY is not set, using insecure placeholder. Set a real key for production.");
    }
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        Some(Commands::Migrate) => run_migrations(&cfg).await,
        Some(Commands::User { command }) => handle_user_command(cfg, command).await,
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("maintenance_api=debug,tower_http=debug"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect_database(cfg: &Config) -> anyhow::Result<PgStore> {
    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;
    tracing::info!("Connecting to database...");
    PgStore::connect(url)
        .await
        .context("failed to connect to database")
}

async fn run_server(cfg: Config, port: Option<u16>) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = if cfg.database_url.is_some() {
        let db = connect_database(&cfg).await?;
        tracing::info!("Running migrations...");
        db.migrate().await?;
        Arc::new(db)
    } else {
        tracing::warn!(
            "DATABASE_URL is not set; running in fallback mode with in-memory demo accounts"
        );
        Arc::new(MemoryStore::with_demo_data()?)
    };

    let port = port.unwrap_or(cfg.port);
    let state = Arc::new(AppState::new(cfg, store));
    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Maintenance Platform API listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn run_migrations(cfg: &Config) -> anyhow::Result<()> {
    let db = connect_database(cfg).await?;
    db.migrate().await?;
    println!("Migrations applied.");
    Ok(())
}

async fn handle_user_command(cfg: Config, cmd: UserCommands) -> anyhow::Result<()> {
    let db = connect_database(&cfg).await?;
    let store: Arc<dyn Store> = Arc::new(db);

    match cmd {
        UserCommands::Create {
            username,
            email,
            password,
            role,
            first_name,
            last_name,
        } => {
            let state = AppState::new(cfg, store);
            let user = state
                .auth
                .create_user(
                    Registration {
                        username,
                        email,
                        password,
                        first_name,
                        last_name,
                    },
                    role,
                )
                .await?;
            println!(
                "User created:\n  ID:       {}\n  Username: {}\n  Email:    {}\n  Role:     {}",
                user.id, user.username, user.email, user.role
            );
        }
        UserCommands::List => {
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<8} {:<24} {:<32} {:<12} {:<8}",
                    "ID", "USERNAME", "EMAIL", "ROLE", "ACTIVE"
                );
                for u in users {
                    println!(
                        "{:<8} {:<24} {:<32} {:<12} {:<8}",
                        u.id, u.username, u.email, u.role, u.is_active
                    );
                }
            }
        }
    }
    Ok(())
}
