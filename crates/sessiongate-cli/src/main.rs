//! Sessiongate CLI - log in, unlock and inspect the saved session from a terminal.
//!
//! Every invocation is a fresh process, so the unlock gate always starts
//! locked. With a PIN set, `header` and `whoami` open the gate first and
//! `change-password` and `delete-account` ask for confirmation.

mod commands;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessiongate_core::auth::SystemClock;
use sessiongate_core::Config;

/// Directory for an optional rolling log file
const ENV_LOG_DIR: &str = "SESSIONGATE_LOG_DIR";

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must stay alive until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(PathBuf::from(dir), "sessiongate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_usage() {
    eprintln!(
        "Usage: sessiongate <command>

Commands:
  status                       Show the saved session and gate state
  login [email]                Log in and save the session
  register <email> <name...>   Create an account and save the session
  logout                       Log out here and on the server
  header                       Print the Authorization header value
  whoami                       Fetch the current user from the server
  unlock                       Run the local PIN check for this run
  set-pin                      Set the local unlock PIN
  change-password              Change password (logs out on success)
  delete-account               Delete the account (logs out on success)"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    let mut config = Config::load()?;
    config.apply_env()?;

    let manager = config.session_manager(config.backend()?, Arc::new(SystemClock));
    let route = manager.start();
    info!(?route, command = %command, "sessiongate starting");

    let result = match command.as_str() {
        "status" => commands::status(&manager),
        "login" => commands::login(&mut config, &manager, args.get(1).cloned()).await,
        "register" => commands::register(&mut config, &manager, &args[1..]).await,
        "logout" => commands::logout(&config, &manager).await,
        "header" => commands::header(&config, &manager),
        "whoami" => commands::whoami(&config, &manager).await,
        "unlock" => commands::unlock(&config, &manager),
        "set-pin" => commands::set_pin(&mut config),
        "change-password" => commands::change_password(&config, &manager).await,
        "delete-account" => commands::delete_account(&config, &manager).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(anyhow::anyhow!("Unknown command: {}", other))
        }
    };

    // Process teardown: the gate never outlives the run.
    manager.on_teardown();
    result
}
