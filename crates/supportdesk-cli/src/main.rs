//! supportdesk - command-line front end for the support widget session.
//!
//! Signs in against the configured ticketing backend, keeps the session in the
//! configured store, and files tickets on behalf of the signed-in user.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use supportdesk_core::{
    AuthState, Config, Credentials, NewTicket, Priority, SessionManager, TicketClient,
};

// ============================================================================
// Constants
// ============================================================================

/// Password source for non-interactive logins
const ENV_PASSWORD: &str = "SUPPORTDESK_PASSWORD";

/// Set to any non-empty value to also log to a daily file in the session directory
const ENV_LOG_FILE: &str = "SUPPORTDESK_LOG_FILE";

const LOG_FILE_PREFIX: &str = "supportdesk.log";

/// Printed in place of tokens; use `supportdesk token` to get the real one
const REDACTED: &str = "<redacted>";

const USAGE: &str = "\
Usage: supportdesk <command>

Commands:
  login [email]               Sign in (password from SUPPORTDESK_PASSWORD or prompt)
  logout                      Sign out and clear the stored session
  status [--json]             Show the current session
  refresh                     Renew the stored session
  token                       Print a valid access token
  ticket <subject> <message>  Open a ticket as the signed-in user
  attach <ticket-id> <path>   Upload a file to a ticket";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = std::env::var(ENV_LOG_FILE)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|_| config.session_dir().ok());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<()> {
    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env()?;

    let _guard = init_tracing(&config);
    info!(base_url = %config.base_url, backend = %config.backend, store = %config.store, "supportdesk starting");

    let sessions = Arc::new(SessionManager::from_config(&config)?);
    let _subscription = sessions.on_state_change(log_transition);

    let command = args[0].as_str();
    let rest = &args[1..];
    match command {
        "login" => login(&sessions, &mut config, rest.first().map(String::as_str)).await,
        "logout" => {
            sessions.logout().await;
            println!("Signed out");
            Ok(())
        }
        "status" => status(&sessions, rest.iter().any(|a| a == "--json")).await,
        "refresh" => {
            let session = sessions.refresh_session().await?;
            println!("Session renewed until {}", format_expiry(session.expires_at));
            Ok(())
        }
        "token" => {
            let token = sessions
                .ensure_access_token()
                .await
                .ok_or_else(|| anyhow!("Not signed in"))?;
            println!("{}", token);
            Ok(())
        }
        "ticket" => {
            let [subject, message] = rest else {
                bail!("Usage: supportdesk ticket <subject> <message>");
            };
            open_ticket(&config, &sessions, subject, message).await
        }
        "attach" => {
            let [ticket_id, path] = rest else {
                bail!("Usage: supportdesk attach <ticket-id> <path>");
            };
            attach(&config, &sessions, ticket_id, Path::new(path)).await
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn log_transition(state: &AuthState) {
    if let Some(ref error) = state.error {
        warn!(error = %error, "Auth state: signed out with error");
    } else if state.is_loading {
        info!("Auth state: loading");
    } else if let Some(ref user) = state.user {
        info!(user_id = %user.id, "Auth state: signed in");
    } else {
        info!("Auth state: signed out");
    }
}

fn format_expiry(expires_at: i64) -> String {
    chrono::DateTime::from_timestamp(expires_at, 0)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| expires_at.to_string())
}

// ============================================================================
// Commands
// ============================================================================

async fn login(sessions: &SessionManager, config: &mut Config, email: Option<&str>) -> Result<()> {
    let email = match email.map(str::to_string).or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };

    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    let session = sessions.login(&Credentials::new(email.clone(), password)).await?;
    println!(
        "Signed in as {} until {}",
        session.user.display_name(),
        format_expiry(session.expires_at)
    );

    if config.last_email.as_deref() != Some(email.as_str()) {
        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to remember email");
        }
    }
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("Email is required");
    }
    Ok(line)
}

async fn status(sessions: &SessionManager, json: bool) -> Result<()> {
    sessions.initialize().await;
    let state = sessions.get_state();

    if json {
        println!("{}", serde_json::to_string_pretty(&redacted(state))?);
        return Ok(());
    }

    match (&state.user, &state.session) {
        (Some(user), Some(session)) if state.is_authenticated => {
            println!("Signed in as {} <{}>", user.display_name(), user.email);
            println!("Role:    {}", user.role());
            println!("Expires: {}", format_expiry(session.expires_at));
        }
        _ => {
            println!("Not signed in");
            if let Some(ref error) = state.error {
                println!("Last error: {}", error);
            }
        }
    }
    Ok(())
}

/// Copy of `state` safe to print: tokens are replaced, everything else kept
fn redacted(mut state: AuthState) -> AuthState {
    if let Some(session) = state.session.as_mut() {
        session.access_token = REDACTED.to_string();
        if session.refresh_token.is_some() {
            session.refresh_token = Some(REDACTED.to_string());
        }
    }
    state
}

async fn open_ticket(
    config: &Config,
    sessions: &Arc<SessionManager>,
    subject: &str,
    message: &str,
) -> Result<()> {
    let user = sessions
        .get_current_user()
        .ok_or_else(|| anyhow!("Not signed in"))?;

    let ticket = NewTicket {
        name: user.display_name().to_string(),
        email: user.email.clone(),
        subject: subject.to_string(),
        message: message.to_string(),
        priority: Priority::default(),
    };

    let client = TicketClient::new(config.adapter_config(), Arc::clone(sessions))?;
    let created = client.create_ticket(&ticket).await?;
    println!("Created ticket {}", created.id);
    Ok(())
}

async fn attach(
    config: &Config,
    sessions: &Arc<SessionManager>,
    ticket_id: &str,
    path: &Path,
) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?;

    let client = TicketClient::new(config.adapter_config(), Arc::clone(sessions))?;
    let attachment = client.upload_file(ticket_id, file_name, bytes, None).await?;
    println!("Uploaded {} as attachment {}", file_name, attachment.id);
    Ok(())
}
