//! # Pogoda
//!
//! Daily weather notifications over Telegram, plus the admin commands that
//! manage subscriptions and answer on-demand weather, holiday and news lookups.
//!
//! Usage:
//!   pogoda serve                                         # Run the scheduler
//!   pogoda subscribe --user 42 --location Білобожниця --time 08:00
//!   pogoda weather Косів                                 # One-off lookup
//!   pogoda status                                        # Today's deliveries

mod cli;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use pogoda_channels::TelegramChannel;
use pogoda_core::config::LoggingConfig;
use pogoda_core::format::{forecast_details, weather_details};
use pogoda_core::types::format_notify_time;
use pogoda_core::PogodaConfig;
use pogoda_info::{holidays, news};
use pogoda_scheduler::{Notifier, Scheduler, SubscriptionDb, SubscriptionExport, SubscriptionManager};
use pogoda_weather::{WeatherService, settlements};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

/// Delivery records older than this are purged when the service starts.
const RECORD_RETENTION_DAYS: u64 = 90;

#[tokio::main]
async fn main() -> Result<()> {
    // BOT_TOKEN / WEATHER_API_KEY may live in a local .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PogodaConfig::load_from(path)?,
        None => PogodaConfig::load()?,
    };
    config.apply_env();
    if let Some(db) = &cli.db {
        config.storage.db_path = db.clone();
    }

    init_logging(&config.logging, cli.verbose, cli.json_logs);

    if !cli.command.uses_store() {
        return lookup(cli.command, &config).await;
    }

    let db = Arc::new(SubscriptionDb::open(&config.storage.db_path())?);
    let manager = SubscriptionManager::new(db.clone()).with_known_locations(settlements::names());

    match cli.command {
        Commands::Serve => serve(&config, db).await?,

        Commands::Subscribe {
            user,
            location,
            time,
            chat,
        } => {
            let chat = chat.unwrap_or_else(|| user.to_string());
            let sub = manager.subscribe(user, &chat, canonical(&location), &time)?;
            println!(
                "✅ User {} subscribed: {} at {}",
                sub.user_id,
                sub.location,
                format_notify_time(sub.notify_time)
            );
        }
        Commands::Unsubscribe { user } => {
            if manager.unsubscribe(user)? {
                println!("🗑️ User {user} unsubscribed");
            } else {
                println!("ℹ️ User {user} was not subscribed");
            }
        }
        Commands::Reschedule { user, time } => {
            let sub = manager.reschedule(user, &time)?;
            println!("⏰ User {user} now notified at {}", format_notify_time(sub.notify_time));
        }
        Commands::SetLocation { user, location } => {
            let sub = manager.set_location(user, canonical(&location))?;
            println!("📍 User {user} location set to {}", sub.location);
        }
        Commands::Pause { user } => {
            manager.pause(user)?;
            println!("⏸️ Notifications paused for user {user}");
        }
        Commands::Resume { user } => {
            manager.resume(user)?;
            println!("▶️ Notifications resumed for user {user}");
        }
        Commands::List { json } => {
            let subs = manager.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&subs)?);
            } else if subs.is_empty() {
                println!("No subscriptions.");
            } else {
                for s in subs {
                    println!(
                        "{:>12}  {}  {:<14} chat={}{}",
                        s.user_id,
                        format_notify_time(s.notify_time),
                        s.location,
                        s.channel_id,
                        if s.enabled { "" } else { "  (paused)" }
                    );
                }
            }
        }
        Commands::Status { date } => {
            let date = match date {
                Some(raw) => parse_date(&raw)?,
                None => today(&config)?,
            };
            let records = db.delivery_records_on(date)?;
            println!("📊 Deliveries on {date}: {}", records.len());
            for r in records {
                println!(
                    "{:>12}  {:<7} attempts={}  {}",
                    r.user_id,
                    r.status.as_str(),
                    r.attempts,
                    r.last_error.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Backup { dir } => {
            let dir = match dir {
                Some(d) => PathBuf::from(shellexpand::tilde(&d).to_string()),
                None => config.storage.backup_dir(),
            };
            let file = db.backup_to(&dir, Utc::now())?;
            println!("💾 Backup written to {}", file.display());
        }
        Commands::Export { user, out } => {
            let export = manager.export(user)?;
            let json = serde_json::to_string_pretty(&export)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("📤 Exported user {user} to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let export: SubscriptionExport = serde_json::from_str(&raw)?;
            let sub = manager.import(&export)?;
            println!("📥 Imported settings for user {}", sub.user_id);
        }
        lookup_command => return lookup(lookup_command, &config).await,
    }

    Ok(())
}

/// Commands that answer from the weather API or static tables only.
async fn lookup(command: Commands, config: &PogodaConfig) -> Result<()> {
    match command {
        Commands::Weather { location } => {
            let service = weather_service(config)?;
            let name = canonical(&location);
            let snapshot = service.current(name).await?;
            println!("*Погода у {name}*\n\n{}", weather_details(&snapshot));
        }
        Commands::Forecast { location } => {
            let service = weather_service(config)?;
            let name = canonical(&location);
            let days = service.forecast(name).await?;
            println!("*Прогноз погоди для {name}*\n\n{}", forecast_details(&days));
        }
        Commands::Holiday { date, year } => {
            if let Some(year) = year {
                for h in holidays::holidays_for(year) {
                    println!("{}  {}", h.date.format("%d.%m"), h.name);
                }
            } else {
                let date = match date {
                    Some(raw) => parse_date(&raw)?,
                    None => today(config)?,
                };
                println!("{}", holidays::today_text(date));
            }
        }
        Commands::News { source } => match source {
            Some(id) => println!("{}", news::link_text(news::source(&id)?)),
            None => println!("{}", news::sources_text()),
        },
        Commands::Settlements => {
            for s in settlements::SETTLEMENTS {
                println!("{:<14} {:.4}, {:.4}", s.name, s.lat, s.lon);
            }
        }
        _ => anyhow::bail!("command needs the subscription store"),
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig, verbose: bool, json: bool) {
    let default = if verbose {
        "pogoda=debug,pogoda_scheduler=debug,pogoda_weather=debug,pogoda_channels=debug"
    } else {
        config.filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if json || config.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn serve(config: &PogodaConfig, db: Arc<SubscriptionDb>) -> Result<()> {
    config.validate_for_serve()?;

    let telegram = TelegramChannel::new(&config.telegram)?;
    let me = telegram.get_me().await?;
    tracing::info!(
        "🤖 Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let today = today(config)?;
    if let Some(cutoff) = today.checked_sub_days(chrono::Days::new(RECORD_RETENTION_DAYS)) {
        let purged = db.purge_records_before(cutoff)?;
        if purged > 0 {
            tracing::info!("🧹 Purged {purged} delivery records older than {cutoff}");
        }
    }

    let weather = WeatherService::from_config(&config.weather)?;
    let notifier = Notifier::from_config(
        db.clone(),
        Arc::new(weather),
        Arc::new(telegram),
        &config.scheduler,
    )?;
    tracing::info!(
        "📋 {} subscriptions, timezone {}",
        db.list_subscriptions()?.len(),
        notifier.timezone()
    );

    let mut scheduler = Scheduler::new(Arc::new(notifier), config.scheduler.tick_interval());
    scheduler.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down...");
    scheduler.stop().await;
    Ok(())
}

fn weather_service(config: &PogodaConfig) -> Result<WeatherService> {
    if config.weather.api_key.trim().is_empty() {
        anyhow::bail!("WEATHER_API_KEY not found in environment or [weather] config");
    }
    Ok(WeatherService::from_config(&config.weather)?)
}

/// Canonical settlement spelling, or the input as given.
fn canonical(location: &str) -> &str {
    settlements::find(location).map(|s| s.name).unwrap_or(location)
}

fn today(config: &PogodaConfig) -> Result<NaiveDate> {
    let tz = config.scheduler.timezone()?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
