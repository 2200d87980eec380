use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use crate::alerts::{AlertSink, SilentAlerts, SystemAlerts};
use crate::audio::AudioEngineHandle;
use crate::history::{HistoryService, HistoryView, Series};
use crate::models::{HistoryQuery, RecordId};
use crate::sensing::OpenCvCamera;
use crate::session::{
    ControllerConfig, SessionController, SessionPhase, SessionSnapshot, StopOutcome, WarningKind,
};
use crate::settings::{Settings, SettingsStore};
use crate::transport::{HttpBackend, RetryPolicy};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::cli";

use crate::{log_info, log_warn};

#[derive(Parser, Debug)]
#[command(name = "eyecare", about = "Blink-rate monitoring against a remote analysis service")]
pub struct Cli {
    /// Settings file; created by `config init`
    #[arg(long, default_value = "eyecare-settings.json")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a detection session until Ctrl-C (saved) or a fatal error
    Detect {
        /// No chime and no desktop notifications; warnings are only printed
        #[arg(long)]
        quiet: bool,
    },
    /// Show saved sessions and their blink-rate series
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,

        /// Maximum records to fetch (defaults to backend.history_limit)
        #[arg(long)]
        limit: Option<u32>,

        /// Print the loaded view as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or write the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Delete one saved session
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings (file plus EYECARE_* overrides)
    Show,
    /// Write the current settings to the settings file
    Init,
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let store = SettingsStore::new(cli.settings.clone())?;
    let settings = store.effective();

    match cli.command {
        Command::Detect { quiet } => detect(&settings, quiet).await,
        Command::History {
            action: Some(HistoryAction::Delete { id }),
            ..
        } => delete_history(&settings, RecordId::from(id.as_str())).await,
        Command::History {
            action: None,
            limit,
            json,
        } => show_history(&settings, limit, json).await,
        Command::Config { action } => configure(&store, action),
    }
}

fn backend(settings: &Settings) -> Result<Arc<HttpBackend>> {
    let backend = HttpBackend::new(&settings.backend.api_base, settings.backend.request_timeout())?;
    Ok(Arc::new(backend))
}

async fn detect(settings: &Settings, quiet: bool) -> Result<()> {
    if quiet {
        return run_detection(settings, Arc::new(SilentAlerts), None).await;
    }

    let audio = AudioEngineHandle::new();
    // A terminal has no reliable focus signal; report "not focused".
    let alerts = Arc::new(SystemAlerts::new(audio.clone(), settings.alerts.clone()));
    run_detection(settings, alerts, Some(audio)).await
}

async fn run_detection<A: AlertSink>(
    settings: &Settings,
    alerts: Arc<A>,
    audio: Option<AudioEngineHandle>,
) -> Result<()> {
    let backend = backend(settings)?;
    let camera = Arc::new(OpenCvCamera::new(settings.camera.clone()));
    let controller = SessionController::new(
        backend,
        camera,
        alerts,
        ControllerConfig::from_settings(settings),
    );

    let mut updates = controller.subscribe();
    controller
        .start()
        .await
        .context("could not start detection")?;
    println!("Detection running against {}. Press Ctrl-C to stop and save.", settings.backend.api_base);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printer = SnapshotPrinter::default();

    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    log_warn!("Ctrl-C handler failed: {err}");
                }
                println!();
                break controller.stop(true).await;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break StopOutcome::AlreadyIdle;
                }
                let snapshot = next_snapshot(&mut updates);
                printer.print(&snapshot);
                if snapshot.phase == SessionPhase::Idle {
                    // Ended by the controller itself.
                    break StopOutcome::AlreadyIdle;
                }
            }
        }
    };

    controller.shutdown().await;
    if let Some(Err(err)) = audio.map(|audio| audio.stop()) {
        log_warn!("audio shutdown failed: {err}");
    }

    match outcome {
        StopOutcome::Saved(summary) => {
            println!(
                "Saved session {}: {} blinks over {} s.",
                summary.session_id, summary.total_blinks, summary.duration_secs
            );
            Ok(())
        }
        StopOutcome::SaveFailed(err) => Err(err).context("session ended but was not saved"),
        StopOutcome::Discarded => Ok(()),
        StopOutcome::AlreadyIdle => {
            let snapshot = controller.snapshot().await;
            match snapshot.warning {
                Some(warning) if warning.kind == WarningKind::Error => bail!("{}", warning.message),
                _ => Ok(()),
            }
        }
    }
}

fn next_snapshot(updates: &mut watch::Receiver<SessionSnapshot>) -> SessionSnapshot {
    updates.borrow_and_update().clone()
}

/// Prints stats and warnings only when they change.
#[derive(Default)]
struct SnapshotPrinter {
    last_stats: Option<(u32, String)>,
    last_warning: Option<String>,
}

impl SnapshotPrinter {
    fn print(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.phase == SessionPhase::Active {
            let stats = (
                snapshot.stats.total_blinks,
                format!("{:.1}", snapshot.stats.blink_rate),
            );
            if self.last_stats.as_ref() != Some(&stats) {
                println!("blinks: {:>5}   rate: {:>6}/min", stats.0, stats.1);
                self.last_stats = Some(stats);
            }
        }

        let warning = snapshot.warning.as_ref().map(|w| w.message.clone());
        if warning != self.last_warning {
            if let Some(message) = &warning {
                println!("{message}");
            }
            self.last_warning = warning;
        }
    }
}

async fn show_history(settings: &Settings, limit: Option<u32>, json: bool) -> Result<()> {
    let service = HistoryService::new(
        backend(settings)?,
        RetryPolicy::single_attempt(settings.backend.request_timeout()),
    );
    let query = HistoryQuery {
        user_id: settings.backend.user_id.clone(),
        device_id: settings.backend.device_id.clone(),
        limit: limit.unwrap_or(settings.backend.history_limit),
    };

    let view = service.load(query).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    print_history(&view);
    Ok(())
}

fn print_history(view: &HistoryView) {
    if let Some(problem) = &view.problem {
        println!("No history to show ({problem}).");
        return;
    }

    print_series("Today", view.aggregation.today.as_ref());
    print_series("Per day", view.aggregation.per_day.as_ref());

    println!();
    println!("{:<10} {:<25} {:>7} {:>10} {:>9}  note", "id", "captured", "blinks", "seconds", "per min");
    for record in &view.records {
        println!(
            "{:<10} {:<25} {:>7} {:>10.1} {:>9.2}  {}{}",
            record.id.to_string(),
            record
                .captured_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            record.blink_count,
            record.stare_duration_sec,
            record.rate(),
            if record.warning_triggered { "⚠️ " } else { "" },
            record.note.as_deref().unwrap_or("")
        );
    }
    if view.skipped > 0 {
        println!("({} malformed rows skipped)", view.skipped);
    }
}

fn print_series(title: &str, series: Option<&Series>) {
    println!("{title}:");
    match series {
        None => println!("  no data"),
        Some(points) => {
            for point in points {
                println!("  {:<12} {:>7.2}", point.label, point.rate);
            }
        }
    }
}

async fn delete_history(settings: &Settings, id: RecordId) -> Result<()> {
    let service = HistoryService::new(
        backend(settings)?,
        RetryPolicy::single_attempt(settings.backend.request_timeout()),
    );
    service
        .delete(id.clone())
        .await
        .with_context(|| format!("could not delete history record {id}"))?;
    println!("Deleted history record {id}.");
    Ok(())
}

fn configure(store: &SettingsStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&store.effective())?);
        }
        ConfigAction::Init => {
            store.save()?;
            log_info!("settings written to {}", store.path().display());
            println!("Wrote {}", store.path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_delete() {
        let cli = Cli::try_parse_from(["eyecare", "history", "delete", "42"]).unwrap();
        match cli.command {
            Command::History {
                action: Some(HistoryAction::Delete { id }),
                ..
            } => assert_eq!(RecordId::from(id.as_str()), RecordId::Int(42)),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.settings, PathBuf::from("eyecare-settings.json"));
    }

    #[test]
    fn parses_history_flags_and_settings_path() {
        let cli = Cli::try_parse_from([
            "eyecare",
            "--settings",
            "/tmp/eyecare.json",
            "history",
            "--limit",
            "10",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.settings, PathBuf::from("/tmp/eyecare.json"));
        assert!(matches!(
            cli.command,
            Command::History {
                action: None,
                limit: Some(10),
                json: true
            }
        ));
    }

    #[test]
    fn detect_is_loud_unless_quiet() {
        let cli = Cli::try_parse_from(["eyecare", "detect"]).unwrap();
        assert!(matches!(cli.command, Command::Detect { quiet: false }));

        let cli = Cli::try_parse_from(["eyecare", "detect", "--quiet"]).unwrap();
        assert!(matches!(cli.command, Command::Detect { quiet: true }));
    }

    #[test]
    fn printer_reports_changes_only() {
        let mut printer = SnapshotPrinter::default();
        let mut snapshot = SessionSnapshot {
            phase: SessionPhase::Active,
            ..Default::default()
        };
        printer.print(&snapshot);
        assert_eq!(printer.last_stats, Some((0, "0.0".to_string())));

        snapshot.stats.total_blinks = 3;
        snapshot.stats.blink_rate = 9.04;
        printer.print(&snapshot);
        assert_eq!(printer.last_stats, Some((3, "9.0".to_string())));
        assert_eq!(printer.last_warning, None);
    }
}
