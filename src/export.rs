//! Best-effort export of overall and per-game statistics to a CSV artifact.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::source::{FetchError, StatsSource};
use crate::stats::{export_ratio, GameStats, StatsTarget, Timeframe, GAME_CATALOG};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("overall statistics unavailable: {0}")]
    Overall(#[source] FetchError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub generated_at: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub overall: GameStats,
    /// Catalog name and stats for each game that fetched successfully.
    pub games: Vec<(String, GameStats)>,
    pub skipped: Vec<String>,
}

/// Fetches the overall stats and every catalog game for `timeframe`.
///
/// Per-game failures are logged and skipped; only a failed overall fetch
/// fails the export.
pub async fn collect_export<S: StatsSource>(
    source: Arc<S>,
    timeframe: Timeframe,
) -> Result<ExportReport, ExportError> {
    let mut pending = JoinSet::new();
    for (idx, game) in GAME_CATALOG.iter().enumerate() {
        let source = Arc::clone(&source);
        let target = StatsTarget::game(timeframe, game);
        pending.spawn(async move { (idx, source.fetch(&target).await) });
    }

    let overall = source
        .fetch(&StatsTarget::overall(timeframe))
        .await
        .map_err(ExportError::Overall)?;

    let mut results: Vec<(usize, Result<GameStats, FetchError>)> =
        Vec::with_capacity(GAME_CATALOG.len());
    while let Some(joined) = pending.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(err) => warn!(
                component = "export",
                event = "export.game.join_failed",
                error = %err
            ),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);

    let mut games = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (idx, result) in results {
        let name = GAME_CATALOG[idx].to_string();
        match result {
            Ok(stats) => games.push((name, stats)),
            Err(err) => {
                warn!(
                    component = "export",
                    event = "export.game.skipped",
                    game = %name,
                    timeframe = %timeframe,
                    error = %err
                );
                skipped.push(name);
            }
        }
    }

    Ok(ExportReport {
        generated_at: Utc::now(),
        timeframe,
        overall,
        games,
        skipped,
    })
}

pub fn export_file_name(timeframe: Timeframe, generated_at: DateTime<Utc>) -> String {
    format!(
        "game-stats-{}-{}.csv",
        timeframe,
        generated_at.format("%Y-%m-%d")
    )
}

pub fn render_export_csv(report: &ExportReport) -> Result<Vec<u8>, ExportError> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    writer.write_record(["Game Statistics Export"])?;
    let generated = report
        .generated_at
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();
    writer.write_record(["Generated", generated.as_str()])?;
    writer.write_record(["Timeframe", report.timeframe.as_str()])?;
    writer.write_record([""])?;

    let overall = &report.overall;
    writer.write_record(["Overall Statistics"])?;
    writer.write_record(["Metric", "Value"])?;
    let metrics = [
        ("Wins", overall.wins.to_string()),
        ("Losses", overall.losses.to_string()),
        ("Games Played", overall.games_played.to_string()),
        ("Win %", format!("{:.2}", overall.win_percentage)),
        ("Loss %", format!("{:.2}", overall.loss_percentage)),
        (
            "W/L Ratio",
            format!("{:.2}", export_ratio(overall.wins, overall.losses)),
        ),
    ];
    for (label, value) in &metrics {
        writer.write_record([*label, value.as_str()])?;
    }
    writer.write_record([""])?;

    writer.write_record(["Per-Game Statistics"])?;
    writer.write_record([
        "Game",
        "Wins",
        "Losses",
        "Games Played",
        "Win %",
        "Loss %",
        "W/L Ratio",
    ])?;
    for (name, stats) in &report.games {
        writer.write_record([
            name.clone(),
            stats.wins.to_string(),
            stats.losses.to_string(),
            stats.games_played.to_string(),
            format!("{:.2}", stats.win_percentage),
            format!("{:.2}", stats.loss_percentage),
            format!("{:.2}", export_ratio(stats.wins, stats.losses)),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))
}

/// Renders `report` and writes it under `dir`, returning the file path.
pub fn write_export(dir: &Path, report: &ExportReport) -> Result<PathBuf, ExportError> {
    let bytes = render_export_csv(report)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(report.timeframe, report.generated_at));
    fs::write(&path, &bytes)?;

    info!(
        component = "export",
        event = "export.written",
        path = %path.display(),
        games = report.games.len(),
        skipped = report.skipped.len()
    );
    Ok(path)
}
