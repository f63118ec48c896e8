use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

/// Logs a stage's start on creation and its duration on [`finish`](Self::finish).
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        info!(stage, "Stage started");
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn finish(self) -> StageTiming {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        info!(stage = self.stage, elapsed_ms, "Stage finished");
        StageTiming {
            stage: self.stage.to_string(),
            elapsed_ms,
        }
    }
}
