//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pogoda",
    version,
    about = "🌤️ Pogoda: daily weather notifications for the Bilobozhnytska community"
)]
pub struct Cli {
    /// Config file (default: ~/.pogoda/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path, overrides [storage] db_path
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the notification scheduler until Ctrl-C
    Serve,

    /// Subscribe a user, or update an existing subscription
    Subscribe {
        #[arg(long)]
        user: i64,
        /// Settlement name
        #[arg(long)]
        location: String,
        /// Local time of day, HH:MM
        #[arg(long, default_value = "08:00")]
        time: String,
        /// Telegram chat id (default: the user id)
        #[arg(long)]
        chat: Option<String>,
    },

    /// Remove a user's subscription
    Unsubscribe {
        #[arg(long)]
        user: i64,
    },

    /// Change a user's notification time
    Reschedule {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        time: String,
    },

    /// Change a user's settlement
    SetLocation {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        location: String,
    },

    /// Stop notifications without deleting the subscription
    Pause {
        #[arg(long)]
        user: i64,
    },

    /// Re-enable a paused subscription
    Resume {
        #[arg(long)]
        user: i64,
    },

    /// List subscriptions
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delivery records for a day (default: today)
    Status {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },

    /// Current weather for a settlement
    Weather { location: String },

    /// 5-day forecast for a settlement
    Forecast { location: String },

    /// Holiday for a day (default: today)
    Holiday {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// List the whole year instead
        #[arg(long)]
        year: Option<i32>,
    },

    /// Local news links
    News {
        /// Source id (suspilne, chortkiv); lists all if omitted
        source: Option<String>,
    },

    /// Known settlements and their coordinates
    Settlements,

    /// Write a copy of the database to the backup directory
    Backup {
        /// Override [storage] backup_dir
        #[arg(long)]
        dir: Option<String>,
    },

    /// Export one user's settings as JSON
    Export {
        #[arg(long)]
        user: i64,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import settings written by `export`
    Import { file: PathBuf },
}

impl Commands {
    /// Whether the command reads or writes the subscription database.
    /// Lookups run without creating it.
    pub fn uses_store(&self) -> bool {
        !matches!(
            self,
            Commands::Weather { .. }
                | Commands::Forecast { .. }
                | Commands::Holiday { .. }
                | Commands::News { .. }
                | Commands::Settlements
        )
    }
}
