//! xpromo CLI
//!
//! Thin command-line front end over `xpromo-core`: builds attributed links
//! for a serialized session, reports banner eligibility, and records
//! dismissals in a JSON store file.

#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use xpromo_core::XPromo;
use xpromo_core::collaborators::StaticContext;
use xpromo_core::config::{LogFormat, XPromoConfig};
use xpromo_core::eligibility::{IneligibilityReason, InterstitialType};
use xpromo_core::error::format_error_with_remediation;
use xpromo_core::listing_click::ListingClickType;
use xpromo_core::logging::{LogError, init_logging};
use xpromo_core::session::{MapCookieJar, SessionState};
use xpromo_core::storage::{JsonFileStore, StorageGate};

#[derive(Parser)]
#[command(name = "xpromo")]
#[command(version, about = "Cross-promotion interstitial eligibility and attributed deep links", long_about = None)]
struct Cli {
    /// Config file (defaults to $XPROMO_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON store file holding dismissal state
    #[arg(long, global = true, env = "XPROMO_STORE")]
    store: Option<PathBuf>,

    /// Run as if durable storage were unavailable (overrides --store)
    #[arg(long, global = true)]
    no_store: bool,

    /// Cookie visible to the session, as NAME=VALUE (repeatable)
    #[arg(long = "cookie", global = true, value_parser = parse_cookie)]
    cookies: Vec<(String, String)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the attributed link for the current page
    Link {
        /// Session state JSON file ("-" for stdin)
        #[arg(long)]
        state: PathBuf,

        /// Interstitial type to attribute (defaults to the page's type)
        #[arg(long)]
        interstitial_type: Option<InterstitialType>,
    },

    /// Print the attributed link for a click on a listing item
    #[command(name = "listing-link")]
    ListingLink {
        #[arg(long)]
        state: PathBuf,

        /// Post id from the session's posts map
        #[arg(long)]
        post: String,

        /// What was clicked (author, subreddit, or anything else)
        #[arg(long)]
        click_type: String,
    },

    /// Report whether the banner may be shown
    Eligibility {
        #[arg(long)]
        state: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },

    /// Print the stored listing-click state as JSON
    #[command(name = "initial-state")]
    InitialState,

    /// Record a banner dismissal now
    #[command(name = "mark-closed")]
    MarkClosed,

    /// Record a listing click
    #[command(name = "mark-click")]
    MarkClick {
        /// RFC 3339 timestamp (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Store the modal dismiss counter
    #[command(name = "set-dismiss-count")]
    SetDismissCount { count: u32 },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Serialize)]
struct EligibilityReport {
    show: bool,
    reason: Option<IneligibilityReason>,
    interstitial_dismissed: bool,
    interstitial_type: Option<InterstitialType>,
}

fn parse_cookie(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<xpromo_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = XPromoConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    match init_logging(&config.logging) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(err) => return Err(err).context("failed to initialize logging"),
    }

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml_string().map_err(xpromo_core::Error::from)?);
        return Ok(());
    }

    let gate = open_gate(&cli, &config);
    let cookies: MapCookieJar = cli.cookies.iter().cloned().collect();
    let xpromo = XPromo::new(config, StaticContext, gate)?.with_cookies(Arc::new(cookies));

    match cli.command {
        Commands::Link {
            state,
            interstitial_type,
        } => {
            let state = read_state(&state)?;
            println!("{}", xpromo.link_for_current_page(&state, interstitial_type));
        }
        Commands::ListingLink {
            state,
            post,
            click_type,
        } => {
            let state = read_state(&state)?;
            let click_type = ListingClickType::from(click_type);
            println!("{}", xpromo.listing_click_link(&state, &post, &click_type)?);
        }
        Commands::Eligibility { state, format } => {
            let state = read_state(&state)?;
            let reason = xpromo.should_not_show_banner(&state);
            let report = EligibilityReport {
                show: reason.is_none(),
                reason,
                interstitial_dismissed: xpromo.is_interstitial_dismissed(&state),
                interstitial_type: xpromo.interstitial_type(&state),
            };
            match format {
                OutputFormat::Plain => {
                    match report.reason {
                        Some(reason) => println!("{reason}"),
                        None => println!("show"),
                    }
                    println!("interstitial_dismissed={}", report.interstitial_dismissed);
                    if let Some(kind) = report.interstitial_type {
                        println!("interstitial_type={kind}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::InitialState => {
            let snapshot = xpromo.listing_click_initial_state();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::MarkClosed => report_write("bannerLastClosed", xpromo.mark_banner_closed()),
        Commands::MarkClick { at } => {
            let at = match at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .with_context(|| format!("--at must be an RFC 3339 timestamp, got {raw:?}"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            report_write("lastModalClick", xpromo.mark_listing_click_timestamp(at));
        }
        Commands::SetDismissCount { count } => {
            report_write("modalDismissCount", xpromo.set_modal_dismiss_count(count));
        }
        Commands::Config => {}
    }
    Ok(())
}

fn report_write(key: &str, written: bool) {
    if written {
        println!("recorded {key}");
    } else {
        println!("storage unavailable; {key} not recorded");
    }
}

/// Storage gate for the CLI session. A store that cannot be opened behaves
/// like unavailable storage.
fn open_gate(cli: &Cli, config: &XPromoConfig) -> StorageGate {
    if cli.no_store {
        return StorageGate::unavailable();
    }
    let path = cli.store.as_deref().unwrap_or(&config.storage.path);
    match JsonFileStore::open(path) {
        Ok(store) => StorageGate::new(Arc::new(store)),
        Err(err) => {
            tracing::warn!(store = %path.display(), error = %err, "Cannot open store; storage unavailable");
            StorageGate::unavailable()
        }
    }
}

fn read_state(path: &Path) -> anyhow::Result<SessionState> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read session state from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session state {}", path.display()))?
    };
    if content.trim().is_empty() {
        bail!("session state {} is empty", path.display());
    }
    let state = serde_json::from_str(&content).map_err(xpromo_core::Error::from)?;
    Ok(state)
}
