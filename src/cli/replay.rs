// src/cli/replay.rs — Feed recorded event logs through the engine

use std::fs::File;
use std::io::{BufRead, BufReader};

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use crate::core::engine::Engine;
use crate::core::intent::Prediction;
use crate::core::types::Event;
use crate::infra::errors::Result;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub events: u64,
    pub skipped: u64,
    pub surfaced: u64,
}

/// Open a JSONL source; "-" reads stdin.
pub fn open_source(path: &str) -> anyhow::Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file = File::open(path).map_err(|e| anyhow::anyhow!("cannot open {path}: {e}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse one log line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<Result<Event>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(Event::from_json(trimmed))
}

/// Stream events through `engine`. `on_output` receives one JSON value per
/// surfaced prediction (every prediction with `all`).
pub async fn replay<R: BufRead>(
    engine: &mut Engine,
    reader: R,
    all: bool,
    mut on_output: impl FnMut(serde_json::Value),
) -> anyhow::Result<ReplaySummary> {
    let mut ui = engine.subscribe();
    let mut summary = ReplaySummary::default();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let event = match parse_line(&line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!("line {}: {}", n + 1, e);
                summary.skipped += 1;
                continue;
            }
        };
        let timestamp = event.timestamp;
        let prediction = engine.process_event(event).await;
        summary.events += 1;

        let mut surfaced = false;
        loop {
            match ui.try_recv() {
                Ok(_) => surfaced = true,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::debug!("UI channel lagged by {}", n);
                    surfaced = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if surfaced {
            summary.surfaced += 1;
        }
        if surfaced || (all && !matches!(prediction, Prediction::Idle { .. })) {
            on_output(json!({
                "line": n + 1,
                "timestamp": timestamp,
                "surfaced": surfaced,
                "prediction": prediction,
            }));
        }
    }
    Ok(summary)
}

pub async fn run_replay(
    engine: &mut Engine,
    file: &str,
    all: bool,
    train: bool,
) -> anyhow::Result<()> {
    let reader = open_source(file)?;
    let summary = replay(engine, reader, all, |value| println!("{value}")).await?;
    eprintln!(
        "replayed {} events ({} skipped), {} predictions surfaced",
        summary.events, summary.skipped, summary.surfaced
    );
    if train {
        run_training(engine).await;
    }
    Ok(())
}

pub async fn run_train(engine: &mut Engine, file: &str) -> anyhow::Result<()> {
    let reader = open_source(file)?;
    let summary = replay(engine, reader, false, |_| {}).await?;
    eprintln!("ingested {} events ({} skipped)", summary.events, summary.skipped);
    run_training(engine).await;
    Ok(())
}

async fn run_training(engine: &mut Engine) {
    match engine.train_model().await {
        Some(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("training finished but the report could not be encoded: {e}"),
        },
        None => eprintln!("training did not run (see log for details)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("# comment").is_none());
        assert!(parse_line(r#"{"type":"user.click","timestamp":1}"#)
            .unwrap()
            .is_ok());
        assert!(parse_line(r#"{"type":"user.teleport","timestamp":1}"#)
            .unwrap()
            .is_err());
    }
}
