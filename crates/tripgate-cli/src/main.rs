//! tripgate - command-line front end for tripgate sessions.
//!
//! Signs in against the issuing service, keeps the token where the web
//! application would, and answers the same access questions the edge guard
//! does.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use reqwest::Url;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tripgate_core::store::JarChannel;
use tripgate_core::{
    token, AccessGuard, ApiClient, Config, Decision, NavigationLog, RegisterPayload, SessionState,
    TokenStore,
};

#[derive(Parser)]
#[command(name = "tripgate", version, about = "Sign in to tripgate and inspect the session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange email and password for a session token
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "TRIPGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, env = "TRIPGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show the session and token expiry as JSON
    Status,
    /// Show what the edge guard decides for a path
    Guard {
        path: String,
        /// Token cookie to evaluate instead of the stored one
        #[arg(long)]
        token: Option<String>,
    },
    /// GET a JSON resource from the application with the stored token
    Fetch { path: String },
}

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr, or to a daily file under `TRIPGATE_LOG_DIR` when set.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var("TRIPGATE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tripgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Everything a command needs, wired from the config.
struct App {
    session: SessionState,
    api: ApiClient,
    guard: AccessGuard,
    nav: Arc<NavigationLog>,
}

impl App {
    fn build(config: &Config) -> Result<Self> {
        let origin = Url::parse(&config.app_origin)
            .with_context(|| format!("Invalid app origin: {}", config.app_origin))?;
        let channel = JarChannel::new(origin);
        let api = ApiClient::from_config(config, channel.jar())?;
        let store = TokenStore::new(config.durable_store()?, Arc::new(channel));

        // The jar lives only as long as this process; seed it from the
        // durable copy the way a browser would still hold the cookie.
        match store.restore_http_channel() {
            Ok(restored) => debug!(restored, "Token cookie restored from durable store"),
            Err(e) => warn!(error = %e, "Failed to restore token cookie"),
        }

        let nav = Arc::new(NavigationLog::new());
        let session = SessionState::new(
            Arc::new(api.clone()),
            store,
            nav.clone(),
            config.session_config(),
        );
        session.init();

        Ok(Self {
            session,
            api,
            guard: AccessGuard::new(config.guard_config()),
            nav,
        })
    }

    fn report_navigation(&self) {
        if let Some(path) = self.nav.last() {
            println!("-> {}", path);
        }
    }

    fn session_error(&self, fallback: &str) -> anyhow::Error {
        let message = self.session.snapshot().error.unwrap_or_else(|| fallback.to_string());
        anyhow::anyhow!(message)
    }
}

fn prompt_password(given: Option<String>) -> Result<String> {
    match given {
        Some(password) => Ok(password),
        None => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let config = Config::load()?;
    debug!(origin = %config.app_origin, storage = ?config.storage, "Config loaded");
    let app = App::build(&config)?;

    match cli.command {
        Command::Login { email, password } => {
            let password = prompt_password(password)?;
            if !app.session.login(&email, &password).await {
                return Err(app.session_error("Login failed"));
            }
            info!("Login successful");
            println!("Signed in as {}", email);
            app.report_navigation();
        }
        Command::Register { email, name, password } => {
            let password = prompt_password(password)?;
            let payload = RegisterPayload {
                name,
                email: email.clone(),
                password,
            };
            if !app.session.register(payload).await {
                return Err(app.session_error("Registration failed"));
            }
            println!("Registered and signed in as {}", email);
            app.report_navigation();
        }
        Command::Logout => {
            app.session.logout();
            println!("Signed out");
            app.report_navigation();
        }
        Command::Whoami => match app.session.current_user() {
            Some(user) => {
                let name = user.name.as_deref().unwrap_or("(no name)");
                let email = user.email.as_deref().unwrap_or("(no email)");
                println!("{} <{}>", name, email);
            }
            None => println!("Not signed in"),
        },
        Command::Status => {
            let expires_at = app
                .session
                .store()
                .get()
                .and_then(|t| token::expiration_of(&t))
                .and_then(|exp| Utc.timestamp_opt(exp.floor() as i64, 0).single())
                .map(|at| at.to_rfc3339());
            let status = serde_json::json!({
                "session": app.session.snapshot(),
                "authenticated": app.session.is_authenticated(),
                "expires_at": expires_at,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Guard { path, token } => {
            let token = token.or_else(|| app.session.store().http_token());
            match app.guard.evaluate(&path, token.as_deref()) {
                Decision::Allow => println!("allow {}", path),
                Decision::Redirect(to) => println!("redirect {} -> {}", path, to),
            }
        }
        Command::Fetch { path } => {
            let body: serde_json::Value = app.api.get_json(app.session.store(), &path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
