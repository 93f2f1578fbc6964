//! nodestate CLI entrypoint.
//!
//! This is the main entrypoint for the nodestate command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use nodestate::cli::{Cli, Commands, LogFormat, OutputFormatter};
use nodestate::config::{ConfigParser, DesiredState, Settings};
use nodestate::error::Result;
use nodestate::reconciler::{Mode, Outcome, Reconciler};
use nodestate::state::{LogDirection, LogFile, Prober};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    let settings = ConfigParser::new().load_settings(cli.scratch_dir.clone(), cli.no_retain);
    debug!(
        "Scratch directory: {} (retain removed: {})",
        settings.scratch_dir.display(),
        settings.retain_removed
    );

    let formatter = OutputFormatter::new(cli.output);

    match run(cli.command, &settings, &formatter) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            print!("{}", formatter.format_error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr so JSON results on stdout stay machine-readable.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Dispatches a command, returning whether it succeeded.
fn run(command: Commands, settings: &Settings, formatter: &OutputFormatter) -> Result<bool> {
    match command {
        Commands::Plan { manifest } => cmd_plan(&manifest, settings, formatter),
        Commands::Apply { manifest, log } => cmd_apply(&manifest, log.as_deref(), settings, formatter),
        Commands::Undo { log } => cmd_replay(&log, LogDirection::Undo, settings, formatter),
        Commands::Redo { log } => cmd_replay(&log, LogDirection::Redo, settings, formatter),
        Commands::Probe {
            path,
            follow_symlinks,
        } => cmd_probe(path, follow_symlinks, formatter),
    }
}

/// Show the plan for a manifest.
fn cmd_plan(manifest: &Path, settings: &Settings, formatter: &OutputFormatter) -> Result<bool> {
    let desired = ConfigParser::new().load_file(manifest)?;
    let reconciler = Reconciler::new(settings);

    match reconciler.plan(&desired) {
        Ok(plan) => {
            print!("{}", formatter.format_plan(&plan));
            Ok(reconciler.execute(&plan, &Mode::DryRun).is_success())
        }
        Err(e) => Ok(report(formatter, &Outcome::from_error(&e))),
    }
}

/// Apply a manifest, optionally saving the undo log.
fn cmd_apply(
    manifest: &Path,
    log: Option<&Path>,
    settings: &Settings,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let desired = ConfigParser::new().load_file(manifest)?;
    info!("Applying {} to {}", manifest.display(), desired.path.display());

    let outcome = Reconciler::new(settings).reconcile(&desired, &Mode::Apply);

    if let (Some(log), Some(undo)) = (log, &outcome.metadata.undo_data) {
        LogFile::new(&desired.path, LogDirection::Undo, undo.clone()).save(log)?;
    }

    Ok(report(formatter, &outcome))
}

/// Replay an undo or redo log, rewriting it in the opposite direction.
fn cmd_replay(
    log: &Path,
    direction: LogDirection,
    settings: &Settings,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let record = LogFile::load_expecting(log, direction)?;
    let desired = DesiredState::new(&record.path);
    info!("Replaying {} {} steps on {}", record.steps.len(), direction, record.path.display());

    let (mode, reverse) = match direction {
        LogDirection::Undo => (Mode::Undo(record.steps), LogDirection::Redo),
        LogDirection::Redo => (Mode::Redo(record.steps), LogDirection::Undo),
    };

    let outcome = Reconciler::new(settings).reconcile(&desired, &mode);

    let reversed = match reverse {
        LogDirection::Redo => outcome.metadata.redo_data.as_ref(),
        LogDirection::Undo => outcome.metadata.undo_data.as_ref(),
    };
    if let Some(steps) = reversed {
        LogFile::new(record.path, reverse, steps.clone()).save(log)?;
    }

    Ok(report(formatter, &outcome))
}

/// Show the observed state of a path.
fn cmd_probe(path: PathBuf, follow_symlinks: bool, formatter: &OutputFormatter) -> Result<bool> {
    let observed = Prober::new().probe(&path, follow_symlinks)?;
    print!("{}", formatter.format_observed(&path, &observed));
    Ok(true)
}

/// Prints an outcome and returns whether it succeeded.
fn report(formatter: &OutputFormatter, outcome: &Outcome) -> bool {
    print!("{}", formatter.format_outcome(outcome));
    outcome.is_success()
}
