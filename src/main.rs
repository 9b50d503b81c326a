use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use keyward::config::Config;
use keyward::db::{self, AppState, queries};
use keyward::models::CreateApplication;

#[derive(Parser)]
#[command(name = "keyward", version, about = "License key issuing and validation server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Register an application for a tenant and print its id
    CreateApp {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Issue a tenant API key and print it (shown only once)
    IssueApiKey {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Revoke a tenant API key by id
    RevokeApiKey {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyward=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = db::create_pool(&config.database_path, 16)
        .with_context(|| format!("opening {}", config.database_path))?;
    {
        let conn = pool.get()?;
        db::init_db(&conn)?;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::CreateApp {
            owner,
            name,
            description,
        } => {
            let conn = pool.get()?;
            let app = queries::create_application(&conn, &owner, &CreateApplication { name, description })?;
            println!("{}", app.id);
            Ok(())
        }
        Command::IssueApiKey { owner, name } => {
            let conn = pool.get()?;
            let (api_key, secret) = queries::create_api_key(&conn, &owner, &name)?;
            tracing::info!(api_key_id = %api_key.id, owner_id = %owner, "issued API key");
            println!("{}", secret);
            Ok(())
        }
        Command::RevokeApiKey { id } => {
            let conn = pool.get()?;
            if !queries::revoke_api_key(&conn, &id)? {
                anyhow::bail!("API key {} not found or already revoked", id);
            }
            tracing::info!(api_key_id = %id, "revoked API key");
            Ok(())
        }
    }
}

async fn serve(config: Config, pool: db::DbPool) -> anyhow::Result<()> {
    let audit_pool = db::create_pool(&config.audit_database_path, 8)
        .with_context(|| format!("opening {}", config.audit_database_path))?;
    {
        let conn = audit_pool.get()?;
        db::init_audit_db(&conn)?;

        if config.audit_log_retention_days > 0 {
            let purged = queries::purge_old_audit_logs(&conn, config.audit_log_retention_days)?;
            if purged > 0 {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    purged,
                    config.audit_log_retention_days
                );
            }
        }
    }

    if !config.audit_log_enabled {
        tracing::warn!("Audit logging is disabled");
    }

    let state = AppState {
        db: pool,
        audit: audit_pool,
        audit_log_enabled: config.audit_log_enabled,
        license_key_prefix: config.license_key_prefix.clone(),
    };

    let app = keyward::app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("keyward listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
