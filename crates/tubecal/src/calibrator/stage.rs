use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Orchestrator stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Loaded,
    Merged,
    PerTubeLoop,
    Calibrated,
    Reported,
    Aborted,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Reported | Stage::Aborted)
    }

    fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Loaded),
            Stage::Loaded => Some(Stage::Merged),
            Stage::Merged => Some(Stage::PerTubeLoop),
            Stage::PerTubeLoop => Some(Stage::Calibrated),
            Stage::Calibrated => Some(Stage::Reported),
            Stage::Reported | Stage::Aborted => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Loaded => "loaded",
            Stage::Merged => "merged",
            Stage::PerTubeLoop => "per-tube loop",
            Stage::Calibrated => "calibrated",
            Stage::Reported => "reported",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Wall time spent in one stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: f64,
}

/// Tracks the current stage and times every transition.
#[derive(Debug)]
pub(crate) struct StageTracker {
    current: Stage,
    entered: Instant,
    timings: Vec<StageTiming>,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        Self {
            current: Stage::Init,
            entered: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub(crate) fn current(&self) -> Stage {
        self.current
    }

    fn close(&mut self, to: Stage) {
        let elapsed_ms = self.entered.elapsed().as_secs_f64() * 1e3;
        self.timings.push(StageTiming {
            stage: self.current,
            elapsed_ms,
        });
        self.current = to;
        self.entered = Instant::now();
    }

    /// Move to the next stage in order. Terminal stages do not advance.
    pub(crate) fn advance(&mut self) -> Stage {
        if let Some(next) = self.current.next() {
            info!("stage {} -> {}", self.current, next);
            self.close(next);
        }
        self.current
    }

    pub(crate) fn abort(&mut self) {
        if !self.current.is_terminal() {
            warn!("stage {} -> {}", self.current, Stage::Aborted);
            self.close(Stage::Aborted);
        }
    }

    pub(crate) fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
