// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Per-Step JSONL Time Series Recorder

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use epoch_engine::demo::DemoWorld;
use epoch_engine::StepReport;

#[derive(Debug, Serialize)]
pub struct StepSnapshot {
    pub step: u64,
    pub population: f64,
    pub resources: f64,
    pub temperature_anomaly: Option<f64>,
    pub mean_stability: f64,
    pub treaties: usize,
    pub cyber_defense: f64,
    pub events: usize,
    pub log_len: usize,
    pub pruned: usize,
    pub summary: bool,
}

impl StepSnapshot {
    pub fn from_step(report: &StepReport, world: &DemoWorld) -> Self {
        Self {
            step: report.step,
            population: world.population,
            resources: world.resources,
            temperature_anomaly: world.climate.as_ref().map(|c| c.temperature_anomaly),
            mean_stability: world.mean_stability(),
            treaties: world.treaties.len(),
            cyber_defense: world.cyber_defense,
            events: report.harvested.len(),
            log_len: report.log_len,
            pruned: report.pruned,
            summary: report.summary.is_some(),
        }
    }
}

/// Accumulates one snapshot per step and writes them as JSONL.
#[derive(Default)]
pub struct TimeSeriesRecorder {
    snapshots: Vec<StepSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &StepReport, world: &DemoWorld) {
        self.snapshots.push(StepSnapshot::from_step(report, world));
    }

    pub fn write_jsonl(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        file.flush()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
}
