//! Lible - command-line console for the school bell schedule backend.
//!
//! Logs in against the backend, keeps the session alive, and lists the
//! timetables, templates, sounds and holidays the account can see.

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lible_core::auth::SessionEvent;
use lible_core::{Config, SessionController};

const USAGE: &str = "\
Usage: lible <command>

Commands:
  login [username]   Log in (prompts for the password)
  logout             End the session and forget stored tokens
  status             Show who is logged in and when the session expires
  timetables         List timetables with their bell times
  templates          List event templates
  sounds             List uploaded sounds
  download <id> <file>
                     Save a sound's audio file
  holidays           List holidays
  watch              Keep the session monitored until it ends or Ctrl+C

Environment:
  LIBLE_API_URL      Backend base URL (default http://localhost:8000/api)
  LIBLE_TOKEN_STORE  file (default) | keyring | memory
  RUST_LOG           Log filter, e.g. RUST_LOG=lible_core=debug";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let session = SessionController::from_config(&config)?;
    info!(api = %config.api_base_url, command, "Lible starting");

    if command != "login" && session.has_stored_token() {
        let valid = session.check_auth().await;
        debug!(valid, "Startup auth check");
    }

    match command {
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "logout" => {
            session.logout().await;
            println!("Logged out.");
            Ok(())
        }
        "status" => status(&session).await,
        "timetables" => {
            require_login(&session)?;
            list_timetables(&session).await
        }
        "templates" => {
            require_login(&session)?;
            list_templates(&session).await
        }
        "sounds" => {
            require_login(&session)?;
            list_sounds(&session).await
        }
        "holidays" => {
            require_login(&session)?;
            list_holidays(&session).await
        }
        "download" => {
            require_login(&session)?;
            download_sound(&session, args.get(1), args.get(2)).await
        }
        "watch" => watch(&session).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => Err(anyhow::anyhow!("Unknown command '{}'\n\n{}", other, USAGE)),
    }
}

fn require_login(session: &SessionController) -> Result<()> {
    if session.is_authenticated() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Not logged in. Run `lible login` first."))
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(
    session: &SessionController,
    config: &mut Config,
    username: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;

    let user = session.login(&username, &password).await?;

    config.last_username = Some(username.clone());
    config.save()?;

    match user {
        Some(user) => println!("Logged in as {} (id {}).", user.username, user.id),
        None => println!("Logged in as {}.", username),
    }
    Ok(())
}

async fn status(session: &SessionController) -> Result<()> {
    if !session.is_authenticated() {
        println!("Not logged in.");
        return Ok(());
    }

    let user = session.current_user().await?;
    println!("Logged in as {} (id {})", user.username, user.id);
    match session.token_expiry() {
        Ok(expires_at) => {
            let remaining = expires_at - Utc::now();
            println!(
                "Session expires at {} ({} min left)",
                expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                remaining.num_minutes().max(0)
            );
        }
        Err(e) => println!("Session expiry unknown: {}", e),
    }

    let api = session.api();
    let (timetables, templates, sounds, holidays) = futures::try_join!(
        api.list_timetables(),
        api.list_templates(),
        api.list_sounds(),
        api.list_holidays(),
    )?;
    println!(
        "{} timetables, {} templates, {} sounds, {} holidays",
        timetables.len(),
        templates.len(),
        sounds.len(),
        holidays.len()
    );
    Ok(())
}

async fn list_timetables(session: &SessionController) -> Result<()> {
    let api = session.api();
    let today = Local::now().date_naive();
    let (timetables, holidays) = futures::try_join!(api.list_timetables(), api.list_holidays())?;
    for timetable in timetables {
        let until = timetable
            .valid_until
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string());
        let marker = if timetable.rings_on(today, &holidays) { "*" } else { " " };
        println!(
            "{} [{}] {}  {} .. {}  {}",
            marker, timetable.id, timetable.name, timetable.valid_from, until, timetable.weekdays
        );

        let mut events = api.list_events(timetable.id).await?;
        events.sort_by_key(|e| e.time());
        for event in events {
            println!("      {}  {}", event.event_time, event.event_name);
        }
    }
    Ok(())
}

async fn list_templates(session: &SessionController) -> Result<()> {
    for template in session.api().list_templates().await? {
        println!("[{}] {}", template.id, template.name);
        let mut items = template.items.clone();
        items.sort_by_key(|i| i.offset_minutes);
        for item in items {
            println!("      {:+4} min  {}", item.offset_minutes, item.event_name);
        }
    }
    Ok(())
}

async fn list_sounds(session: &SessionController) -> Result<()> {
    for sound in session.api().list_sounds().await? {
        println!("[{}] {}  ({})", sound.id, sound.name, sound.filename);
    }
    Ok(())
}

async fn list_holidays(session: &SessionController) -> Result<()> {
    for holiday in session.api().list_holidays().await? {
        println!(
            "[{}] {}  {} .. {}  ({} days)",
            holiday.id,
            holiday.name,
            holiday.valid_from,
            holiday.valid_until,
            holiday.length_days()
        );
    }
    Ok(())
}

async fn download_sound(
    session: &SessionController,
    id: Option<&String>,
    file: Option<&String>,
) -> Result<()> {
    let (Some(id), Some(file)) = (id, file) else {
        return Err(anyhow::anyhow!("Usage: lible download <sound-id> <file>"));
    };
    let id: i64 = id.parse().with_context(|| format!("Invalid sound id '{}'", id))?;

    let bytes = session.api().download_sound(id).await?;
    std::fs::write(file, &bytes).with_context(|| format!("Failed to write {}", file))?;
    println!("Saved sound {} to {} ({} bytes).", id, file, bytes.len());
    Ok(())
}

/// Print session events until the session ends or the user interrupts.
async fn watch(session: &SessionController) -> Result<()> {
    require_login(session)?;
    let mut events = session.subscribe();
    println!("Watching session. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::ExpiringSoon { expires_at }) => {
                    let left = (expires_at - Utc::now()).num_minutes().max(0);
                    println!("Session expires in {} min. Log in again to continue.", left);
                }
                Ok(SessionEvent::Expired { reason }) => println!("Session ended: {}.", reason),
                Ok(SessionEvent::LoginRequired) => {
                    println!("Please run `lible login`.");
                    return Ok(());
                }
                Ok(SessionEvent::LoggedOut) => return Ok(()),
                Ok(SessionEvent::LoggedIn { username }) => debug!(username = %username, "Logged in"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed session events"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}
