//! # taxdesk
//!
//! Tax portal notification server binary: wires settings, telemetry, the
//! message store, and the token verifier into the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use taxdesk_auth::JwtAuthenticator;
use taxdesk_client::{ClientConfig, ConnectionManager, LogAlerts, RecordingCache};
use taxdesk_core::{Role, UserId, UserProfile};
use taxdesk_server::metrics::install_recorder;
use taxdesk_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use taxdesk_server::{ServerConfig, TaxdeskServer};
use taxdesk_settings::{TaxdeskSettings, load_settings_from_path, settings_path};
use taxdesk_store::{Database, UserRepo};
use taxdesk_telemetry::{TelemetryConfig, init_telemetry};

/// Tax portal notification server.
#[derive(Parser, Debug)]
#[command(name = "taxdesk", about = "Real-time notifications and conversations for the tax portal")]
struct Cli {
    /// Settings file (defaults to `~/.taxdesk/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server until ctrl-c.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides settings; 0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Issue a bearer token for a user.
    Token {
        /// User id.
        #[arg(long)]
        user: String,
        /// Portal role (`client`, `preparer`, `admin`).
        #[arg(long, default_value = "client")]
        role: String,
    },
    /// Create or update a user in the directory.
    AddUser {
        /// User id.
        #[arg(long)]
        id: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Portal role (`client`, `preparer`, `admin`).
        #[arg(long, default_value = "client")]
        role: String,
    },
    /// Connect to a server's push channel and log every notification.
    Watch {
        /// REST origin of the server, e.g. `http://127.0.0.1:8780`.
        #[arg(long)]
        url: String,
        /// Bearer token.
        #[arg(long)]
        token: String,
    },
}

fn parse_role(role: &str) -> Result<Role> {
    match role.parse() {
        Ok(role) => Ok(role),
        Err(e) => bail!(e),
    }
}

fn open_database(settings: &TaxdeskSettings) -> Result<Database> {
    let path = Path::new(&settings.database.path);
    Database::open(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

fn authenticator(settings: &TaxdeskSettings) -> JwtAuthenticator {
    JwtAuthenticator::new(
        &settings.auth.jwt_secret,
        settings.auth.issuer.clone(),
        Duration::from_secs(settings.auth.token_ttl_secs),
    )
}

async fn serve(settings: &TaxdeskSettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    if settings.auth.uses_dev_secret() {
        tracing::warn!("using the built-in development JWT secret; set TAXDESK_JWT_SECRET in production");
    }

    let db = open_database(settings)?;
    let metrics_handle = install_recorder().context("Failed to install metrics recorder")?;

    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let server = TaxdeskServer::new(config, db, Arc::new(authenticator(settings)), metrics_handle);
    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!("taxdesk listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().drain(DEFAULT_DRAIN_TIMEOUT).await {
        tracing::warn!("some server tasks did not stop in time");
    }
    Ok(())
}

async fn watch(url: &str, token: String) -> Result<()> {
    let config = ClientConfig::new(url).context("Invalid server URL")?;
    let handle = ConnectionManager::spawn(config, Arc::new(RecordingCache::new()), Arc::new(LogAlerts));
    handle.set_token(token).context("Connection manager stopped")?;

    let mut state = handle.subscribe();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!(state = ?*state.borrow(), "push channel");
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                break;
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings: {}", path.display()))?;

    let _ = init_telemetry(&TelemetryConfig::with_level(
        &settings.telemetry.level,
        settings.telemetry.json,
    ));

    match cli.command {
        Command::Serve { host, port } => serve(&settings, host, port).await,
        Command::Token { user, role } => {
            let token = authenticator(&settings)
                .issue(&UserId::from_raw(user), parse_role(&role)?)
                .context("Failed to issue token")?;
            println!("{token}");
            Ok(())
        }
        Command::AddUser { id, name, role } => {
            let profile = UserProfile {
                id: UserId::from_raw(id),
                display_name: name,
                role: parse_role(&role)?,
            };
            UserRepo::new(open_database(&settings)?)
                .upsert(&profile)
                .context("Failed to store user")?;
            println!("{}", profile.id);
            Ok(())
        }
        Command::Watch { url, token } => watch(&url, token).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve() {
        let cli = Cli::try_parse_from(["taxdesk", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Command::Serve { port: Some(9000), .. }));
    }

    #[test]
    fn cli_parses_token_with_global_config() {
        let cli = Cli::try_parse_from(["taxdesk", "token", "--user", "usr_1", "--config", "/tmp/s.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.json")));
        assert!(matches!(cli.command, Command::Token { ref role, .. } if role == "client"));
    }

    #[test]
    fn role_parsing() {
        assert_eq!(parse_role("preparer").unwrap(), Role::Preparer);
        assert!(parse_role("owner").is_err());
    }

    #[test]
    fn issued_token_verifies() {
        use taxdesk_auth::TokenVerifier;
        let settings = TaxdeskSettings::default();
        let auth = authenticator(&settings);
        let token = auth.issue(&UserId::from_raw("usr_1"), Role::Admin).unwrap();
        assert_eq!(auth.verify(&token).unwrap().role, Role::Admin);
    }
}
