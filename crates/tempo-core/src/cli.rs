use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "tempo",
    version,
    about = "Tempo: task, focus and progress tracking against a hosted backend",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Alternative config file (defaults to ~/.temporc or $TEMPORC).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Alternative state directory (defaults to data.location).
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Config overrides, e.g. --rc backend.url=https://...
    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account; a profile is completed on first sign-in.
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and cache the session locally.
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Revoke the remote session and clear the cached one.
    Signout,
    /// Show the authenticated user and profile.
    Whoami,
    /// Re-send the sign-up confirmation email.
    ResendConfirmation {
        #[arg(long)]
        email: Option<String>,
    },
    /// Request a password-reset email.
    ResetPassword {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        redirect: Option<String>,
    },

    /// Add a task.
    Add {
        title: Vec<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Deadline expression: today, friday, 3:30pm, +2d, 2026-05-01 ...
        #[arg(long)]
        due: Option<String>,
        /// Category name; created on the fly when unknown.
        #[arg(long)]
        category: Option<String>,
    },
    /// List tasks.
    List {
        /// Include completed tasks even when the preference hides them.
        #[arg(long)]
        all: bool,
    },
    /// Toggle a task's completion flag.
    Toggle { id: String },
    /// Edit a task's fields.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, conflicts_with = "no_due")]
        due: Option<String>,
        #[arg(long)]
        no_due: bool,
        #[arg(long, conflicts_with = "no_category")]
        category: Option<String>,
        #[arg(long)]
        no_category: bool,
    },
    /// Delete a task.
    Rm { id: String },
    /// Delete every completed task.
    ClearCompleted,

    /// Manage task categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommand,
    },

    /// Focus-session timing.
    Focus {
        #[command(subcommand)]
        command: FocusCommand,
    },

    /// Dashboard statistics.
    Stats {
        #[command(subcommand)]
        command: StatsCommand,
    },

    /// Display preferences.
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// Follow the realtime change feed and keep a view fresh.
    Watch {
        /// Table to follow: tasks or focus_sessions.
        #[arg(long, default_value = "tasks")]
        table: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoriesCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Rm { name: String },
}

#[derive(Subcommand, Debug)]
pub enum FocusCommand {
    /// Start the focus timer.
    Start {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Show the running timer.
    Status,
    /// Stop the timer and record the session.
    Stop {
        /// Override the session name recorded at start.
        #[arg(long)]
        name: Option<String>,
    },
    /// List recent sessions.
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum StatsCommand {
    /// Completion percentage, today or all time.
    Progress {
        #[arg(long)]
        all_time: bool,
    },
    /// Per-weekday focus totals.
    Weekly {
        /// Weeks before the current one.
        #[arg(long, default_value_t = 0)]
        back: u32,
    },
    /// Per-weekday completed/pending counts by deadline.
    Trend {
        #[arg(long, default_value_t = 0)]
        back: u32,
    },
    /// Month grid of 100%-completion days.
    Heatmap {
        /// Months before the current one.
        #[arg(long, default_value_t = 0)]
        back: u32,
    },
    /// Top focus categories by session count.
    Top {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Today's focus total compared with yesterday.
    Today,
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    /// Flip a toggle: completed | descriptions | categories.
    Set { toggle: String, value: String },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
