//! SiteScout - site-selection recommendations from the terminal.
//!
//! Each view command opens a route. Routes that need a session go through
//! the login prompt first and then continue to where the user was headed.

mod app;
mod views;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitescout_core::models::{LandUse, ProjectRequirements, Registration, DEFAULT_ROLE, ROLES};
use sitescout_core::{Config, Route};

use app::{App, Overrides, ViewRequest};

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "sitescout.log";

#[derive(Parser, Debug)]
#[command(name = "sitescout", version, about = "AI-assisted site selection from the terminal")]
struct Cli {
    /// Backend address (overrides the config file)
    #[arg(long, global = true, env = "SITESCOUT_API_URL")]
    api_url: Option<String>,

    /// After login, always go to the site-selection view
    #[arg(long, global = true)]
    default_landing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and keep the session for later commands
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account and sign in with it
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long, default_value = DEFAULT_ROLE, value_parser = PossibleValuesParser::new(ROLES.iter().copied()))]
        role: String,
    },
    /// End the current session
    Logout,
    /// Show who is signed in and when the session expires
    Status,
    /// Show the signed-in user's profile
    Profile,
    /// List past analyses, or show the results of one
    History {
        /// Job id of a past analysis
        id: Option<String>,
        /// Also fetch the results of every listed analysis
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Run a new site analysis
    Recommend(RecommendArgs),
    /// Open a view by path, e.g. `/dashboard/history`
    Open { path: String },
}

#[derive(Args, Debug)]
struct RecommendArgs {
    /// Project title
    #[arg(short, long)]
    title: String,
    /// Budget limit in USD per square metre
    #[arg(long)]
    budget: Option<f64>,
    /// Maximum distance to the nearest road in km
    #[arg(long)]
    max_road_dist: Option<f64>,
    /// Maximum terrain slope in degrees
    #[arg(long)]
    max_slope: Option<f64>,
    /// Environmental risk tolerance between 0 and 1
    #[arg(long)]
    risk_tolerance: Option<f64>,
    /// Preferred land use, comma separated
    #[arg(long = "land-use", value_delimiter = ',', value_parser = parse_land_use)]
    land_use: Vec<LandUse>,
}

impl RecommendArgs {
    fn into_requirements(self) -> ProjectRequirements {
        let defaults = ProjectRequirements::default();
        ProjectRequirements {
            title: self.title,
            budget_limit_usd_sqm: self.budget.unwrap_or(defaults.budget_limit_usd_sqm),
            max_road_dist_km: self.max_road_dist.unwrap_or(defaults.max_road_dist_km),
            max_slope_deg: self.max_slope.unwrap_or(defaults.max_slope_deg),
            environmental_risk_tolerance: self
                .risk_tolerance
                .unwrap_or(defaults.environmental_risk_tolerance),
            preferred_land_use: if self.land_use.is_empty() {
                defaults.preferred_land_use
            } else {
                self.land_use
            },
        }
    }
}

fn parse_land_use(s: &str) -> Result<LandUse, String> {
    LandUse::from_name(s.trim()).ok_or_else(|| {
        let names: Vec<&str> = LandUse::ALL.iter().map(LandUse::as_str).collect();
        format!("unknown land use '{}' (expected one of: {})", s, names.join(", "))
    })
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug). When a log
/// directory is configured, logs are also written there daily-rotated.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
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

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {:#}. Using default settings.", e);
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config();
    let log_dir: Option<PathBuf> = config.log_dir.clone();
    let _log_guard = init_tracing(log_dir.as_deref());

    let overrides = Overrides {
        api_url: cli.api_url,
        default_landing: cli.default_landing,
    };

    info!(command = ?cli.command, "SiteScout starting");
    match run(cli.command, config, &overrides).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warn!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config, overrides: &Overrides) -> Result<()> {
    let mut app = App::new(config, overrides)?;

    match command {
        Command::Login { username } => app.login_interactive(username).await,
        Command::Register { username, email, role } => {
            let registration = Registration {
                username,
                password: String::new(),
                email: email.filter(|e| !e.trim().is_empty()),
                role,
            };
            app.register(registration).await
        }
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Status => {
            app.print_status();
            Ok(())
        }
        Command::Profile => app.navigate(Route::Profile, &ViewRequest::default()).await,
        Command::History { id: Some(id), .. } => {
            app.navigate(Route::HistoryDetail(id), &ViewRequest::default())
                .await
        }
        Command::History { id: None, all } => {
            let request = ViewRequest {
                expand_history: all,
                ..ViewRequest::default()
            };
            app.navigate(Route::History, &request).await
        }
        Command::Recommend(args) => {
            let request = ViewRequest {
                requirements: Some(args.into_requirements()),
                ..ViewRequest::default()
            };
            app.navigate(Route::SiteSelection, &request).await
        }
        Command::Open { path } => app.navigate(Route::parse(&path), &ViewRequest::default()).await,
    }
}
