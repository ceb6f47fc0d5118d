use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::warn;

use sessiongate_core::auth::{LocalPin, PresenceOutcome, PresenceRequest, Route};
use sessiongate_core::config::APP_NAME;
use sessiongate_core::{ApiError, AuthClient, Config, SessionError, SessionManager};

fn prompt_line(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn prompt_secret(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

fn client(config: &Config) -> Result<AuthClient> {
    AuthClient::new(&config.api_base_url).context("Failed to build HTTP client")
}

fn pin_prompt(config: &Config) -> LocalPin {
    config.pin_presence(|request| {
        eprintln!("{}", request.title);
        eprintln!("{}", request.subtitle);
        rpassword::prompt_password("PIN (empty to cancel): ")
            .ok()
            .filter(|pin| !pin.is_empty())
    })
}

/// Repeat `attempt` while the PIN is merely wrong.
fn retry_presence(
    pin: &LocalPin,
    mut attempt: impl FnMut() -> Result<(), SessionError>,
) -> Result<()> {
    loop {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(SessionError::LocalPresenceDenied(PresenceOutcome::Failed)) => {
                eprintln!(
                    "{} ({} attempts left)",
                    PresenceOutcome::Failed,
                    pin.remaining_attempts()
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Open the gate before a protected command when a PIN is enrolled.
fn require_unlock(config: &Config, manager: &SessionManager) -> Result<()> {
    if !config.requires_presence() {
        return Ok(());
    }
    let pin = pin_prompt(config);
    let request = PresenceRequest::unlock(APP_NAME);
    retry_presence(&pin, || manager.unlock(&pin, &request))
}

/// Confirm a sensitive action when a PIN is enrolled, even if unlocked.
fn require_confirmation(config: &Config, manager: &SessionManager, action: &str) -> Result<()> {
    if !config.requires_presence() {
        return Ok(());
    }
    let pin = pin_prompt(config);
    let request = PresenceRequest::confirm_action(action);
    retry_presence(&pin, || manager.confirm(&pin, &request))
}

/// Report an API failure, dropping the session on 401.
fn api_failure(manager: &SessionManager, err: ApiError) -> anyhow::Error {
    if manager.handle_api_error(&err) {
        eprintln!("Session is no longer valid. Please log in again.");
    }
    anyhow::anyhow!(err.user_message())
}

pub fn status(manager: &SessionManager) -> Result<()> {
    let Some(record) = manager.current() else {
        println!("Not logged in");
        return Ok(());
    };
    let now = manager.store().now_millis();

    println!("User:     {} <{}>", record.label(), record.email);
    println!("User ID:  {}", record.user_id);
    match record.expires_at_utc() {
        Some(at) => println!(
            "Expires:  {} ({} min left)",
            at.format("%Y-%m-%d %H:%M UTC"),
            record.minutes_until_expiry(now).unwrap_or(0)
        ),
        None => println!("Expires:  never"),
    }
    if manager.needs_refresh() {
        println!("          token expires soon - log in again to refresh");
    }
    println!("Storage:  {}", manager.store().describe());
    println!("Gate:     {}", manager.gate().state());
    Ok(())
}

pub async fn login(config: &mut Config, manager: &SessionManager, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let password = prompt_secret("Password: ")?;

    let response = client(config)?
        .login(&email, &password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let record = manager.complete_auth(&response)?;

    config.last_email = Some(record.email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Logged in as {}", record.label());
    Ok(())
}

pub async fn register(config: &mut Config, manager: &SessionManager, args: &[String]) -> Result<()> {
    let Some((email, name)) = args.split_first() else {
        anyhow::bail!("Usage: sessiongate register <email> <full name>");
    };
    let full_name = name.join(" ");
    if full_name.is_empty() {
        anyhow::bail!("Full name is required");
    }
    let password = prompt_secret("Password: ")?;
    let confirm = prompt_secret("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let response = client(config)?
        .register(email, &password, &full_name)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let record = manager.complete_auth(&response)?;

    config.last_email = Some(record.email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Account created for {}", record.email);
    Ok(())
}

pub async fn logout(config: &Config, manager: &SessionManager) -> Result<()> {
    if manager.store().is_logged_in() {
        // Clear locally whatever the server says.
        if let Err(e) = client(config)?.logout(manager.store()).await {
            warn!(error = %e, "Server logout failed, clearing local session anyway");
        }
    }
    manager.logout();
    println!("Logged out");
    Ok(())
}

pub fn header(config: &Config, manager: &SessionManager) -> Result<()> {
    require_unlock(config, manager)?;
    let value = manager
        .bearer_header()
        .ok_or(SessionError::NotLoggedIn)?;
    println!("{}", value);
    Ok(())
}

pub async fn whoami(config: &Config, manager: &SessionManager) -> Result<()> {
    require_unlock(config, manager)?;
    let user = client(config)?
        .current_user(manager.store())
        .await
        .map_err(|e| api_failure(manager, e))?;
    println!("{} <{}>", user.full_name.as_deref().unwrap_or("-"), user.email);
    println!("ID: {}  verified: {}", user.id, user.email_verified);
    Ok(())
}

pub fn unlock(config: &Config, manager: &SessionManager) -> Result<()> {
    if manager.route() == Route::Welcome {
        anyhow::bail!(SessionError::NotLoggedIn);
    }

    let pin = pin_prompt(config);
    let request = PresenceRequest::unlock(APP_NAME);
    retry_presence(&pin, || manager.unlock(&pin, &request))?;

    println!("Unlocked ({})", manager.gate().state());
    Ok(())
}

pub fn set_pin(config: &mut Config) -> Result<()> {
    let pin = prompt_secret("New PIN: ")?;
    if pin.len() < 4 {
        anyhow::bail!("PIN must be at least 4 characters");
    }
    if prompt_secret("Repeat PIN: ")? != pin {
        anyhow::bail!("PINs do not match");
    }
    config.presence_pin_hash =
        Some(LocalPin::hash(&pin).map_err(|e| anyhow::anyhow!("Failed to hash PIN: {}", e))?);
    config.save()?;
    println!("PIN saved");
    Ok(())
}

pub async fn change_password(config: &Config, manager: &SessionManager) -> Result<()> {
    require_confirmation(config, manager, "change your password")?;
    let old_password = prompt_secret("Current password: ")?;
    let new_password = prompt_secret("New password: ")?;

    client(config)?
        .change_password(manager.store(), &old_password, &new_password)
        .await
        .map_err(|e| api_failure(manager, e))?;

    // Server revokes the old token.
    manager.logout();
    println!("Password changed. Please log in again.");
    Ok(())
}

pub async fn delete_account(config: &Config, manager: &SessionManager) -> Result<()> {
    let confirm = prompt_line("Type DELETE to remove your account: ")?;
    if confirm != "DELETE" {
        println!("Cancelled");
        return Ok(());
    }
    require_confirmation(config, manager, "delete your account")?;
    let password = prompt_secret("Password: ")?;

    client(config)?
        .delete_account(manager.store(), &password)
        .await
        .map_err(|e| api_failure(manager, e))?;

    manager.logout();
    println!("Account deleted");
    Ok(())
}
