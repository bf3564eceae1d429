//! colorkit - settings and stylesheet tooling for the ColorKit engines.
//!
//! The engines themselves run inside the calendar page; this binary works on
//! the settings documents they read: inspecting, validating and merging them,
//! printing the stylesheets they would inject, and following live edits.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, warn};

use colorkit::storage::{FileSettingsStore, SettingsStore, StoreChange, load_document};
use colorkit_core::column_map::arithmetic;
use colorkit_core::css::{ColumnPaint, WEEK_STRATEGIES, day_view_css, week_view_css};
use colorkit_core::settings::merge_values;
use colorkit_core::view::weekday_index;
use colorkit_core::{Config, Settings, logging};

/// How often `watch` dispatches file changes.
const WATCH_POLL_MS: u64 = 200;

/// colorkit - settings and stylesheet tooling for ColorKit
#[derive(Parser, Debug)]
#[command(name = "colorkit", version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (uses XDG lookup if not specified)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print example configuration and exit
    #[arg(long)]
    print_example_config: bool,

    /// Validate configuration and exit (returns non-zero on errors)
    #[arg(long)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and edit settings documents
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the stylesheet day coloring would inject
    Css {
        #[command(subcommand)]
        view: CssView,
    },
    /// Follow a settings file and log every change
    Watch {
        /// Settings document to watch
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the default settings object
    Defaults,
    /// Validate a settings document and summarize it
    Check {
        /// Settings document (`{"settings": ..., "taskColors": ...}`)
        file: PathBuf,
    },
    /// Deep-merge a patch into a settings object and print the result
    Merge {
        /// Base settings object
        base: PathBuf,
        /// Patch to apply
        patch: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CssView {
    /// Week or custom-days grid
    Week {
        /// Settings document
        file: PathBuf,
        /// Visible day columns (5 with weekends hidden, 7 otherwise)
        #[arg(long, default_value = "7")]
        columns: usize,
    },
    /// Single-day view
    Day {
        /// Settings document
        file: PathBuf,
        /// Date shown, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    logging::init(args.verbose);

    // Subcommands only need the settings files they are given.
    if let Some(command) = args.command {
        return match handle_command(command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    if args.print_example_config {
        print!("{}", colorkit_core::config::DEFAULT_CONFIG_TOML);
        return ExitCode::SUCCESS;
    }

    // If --config is specified, it must exist and be valid (no fallback)
    let load_result = match Config::find_and_load(args.config.as_deref()) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref source) = load_result.source {
        info!("Loaded configuration from {:?}", source);
    } else if load_result.used_defaults {
        warn!("Using default configuration (no config file found)");
    }

    let config = load_result.config;
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    debug!("Configuration validated successfully");

    if args.check_config {
        if let Some(ref source) = load_result.source {
            println!("Configuration valid: {}", source.display());
        } else {
            println!("Configuration valid (using defaults)");
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", config.summary());
    ExitCode::SUCCESS
}

fn handle_command(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Settings { action } => handle_settings_command(action),
        Command::Css { view } => handle_css_command(view),
        Command::Watch { file } => watch(&file),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Settings from a stored document, defaults filling whatever is missing.
fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let document = load_document(path).with_context(|| format!("loading {}", path.display()))?;
    let stored = document.settings.unwrap_or(Value::Null);
    Ok(Settings::from_value(&stored)?)
}

fn handle_settings_command(action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Defaults => {
            println!("{}", serde_json::to_string_pretty(&Settings::defaults_value())?);
        }
        SettingsAction::Check { file } => {
            let document =
                load_document(&file).with_context(|| format!("loading {}", file.display()))?;
            let settings = Settings::from_value(&document.settings.unwrap_or(Value::Null))?;
            settings.validate()?;
            println!("Settings valid: {}", file.display());
            println!("{}", settings.summary());
            let task_colors = document.task_colors.unwrap_or_default();
            println!("Task colors: {}", task_colors.len());
            if let Some(active) = document.subscription_active {
                println!("Subscription active: {active}");
            }
        }
        SettingsAction::Merge { base, patch } => {
            let mut merged = read_json(&base)?;
            merge_values(&mut merged, read_json(&patch)?);
            Settings::from_value(&merged)?.validate()?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }
    Ok(())
}

fn handle_css_command(view: CssView) -> anyhow::Result<()> {
    match view {
        CssView::Week { file, columns } => {
            let settings = load_settings(&file)?;
            let mapping = match columns {
                5 => colorkit_core::column_map::weekends_hidden(),
                7 => arithmetic(columns, settings.week_start()),
                other => bail!("cannot map a {other}-column grid to weekdays"),
            };
            let paints: Vec<ColumnPaint> = mapping
                .iter()
                .filter_map(|(column, weekday)| {
                    settings
                        .rgba_for_day(weekday, None)
                        .map(|rgba| ColumnPaint { column, rgba })
                })
                .collect();
            print!("{}", week_view_css(&paints, mapping.len(), WEEK_STRATEGIES));
        }
        CssView::Day { file, date } => {
            let settings = load_settings(&file)?;
            match settings.rgba_for_day(weekday_index(date), Some(date)) {
                Some(rgba) => print!("{}", day_view_css(&rgba, date)),
                None => println!("/* no color for {date} */"),
            }
        }
    }
    Ok(())
}

/// Log every change made to `file` until interrupted.
fn watch(file: &Path) -> anyhow::Result<()> {
    let store = FileSettingsStore::open(file)?;
    store.on_change(Box::new(|change: &StoreChange| match change {
        StoreChange::Settings(settings) => match Settings::from_value(settings) {
            Ok(settings) => info!("Settings changed:\n{}", settings.summary()),
            Err(e) => warn!("Settings changed but are unreadable: {e}"),
        },
        StoreChange::TaskColors(colors) => info!("Task colors changed ({} tasks)", colors.len()),
        StoreChange::Subscription(active) => info!("Subscription active: {active}"),
    }));
    store.start_watching()?;
    println!("Watching {} (Ctrl-C to stop)", store.path().display());

    loop {
        thread::sleep(Duration::from_millis(WATCH_POLL_MS));
        store.poll_changes();
    }
}
