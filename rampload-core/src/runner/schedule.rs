use std::time::Duration;

use super::config::Stage;
use super::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear VU target over time, anchored at run start.
#[derive(Debug, Clone)]
pub struct RunTimeline {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

struct Located {
    index: usize,
    stage_start: Duration,
    stage_end: Duration,
    start_target: u64,
    end_target: u64,
}

impl RunTimeline {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        Self::with_start(0, stages)
    }

    /// Timeline whose first stage ramps from `start` instead of zero.
    pub fn with_start(start: u64, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::EmptyStages);
        }
        if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(Error::ZeroStageDuration { index });
        }

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Ok(Self {
            start,
            stages,
            cumulative_ends,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_target(&self) -> u64 {
        self.start
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Highest target reached anywhere on the timeline.
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    // Callers guarantee `elapsed < total_duration()`. A stage owns its end boundary.
    fn locate(&self, elapsed: Duration) -> Located {
        let index = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) | Err(i) => i.min(self.stages.len() - 1),
        };
        Located {
            index,
            stage_start: if index == 0 {
                Duration::ZERO
            } else {
                self.cumulative_ends[index - 1]
            },
            stage_end: self.cumulative_ends[index],
            start_target: if index == 0 {
                self.start
            } else {
                self.stages[index - 1].target
            },
            end_target: self.stages[index].target,
        }
    }

    /// Number of VUs that should be live `elapsed` after run start.
    ///
    /// Within a stage the value is interpolated linearly and truncated toward the stage's
    /// start target, so it never leaves `[start_target, end_target]`.
    pub fn desired_vus(&self, elapsed: Duration) -> u64 {
        if elapsed.is_zero() {
            return self.start;
        }
        if self.is_done(elapsed) {
            return self.stages.last().map_or(self.start, |s| s.target);
        }

        let at = self.locate(elapsed);
        let stage_duration = at.stage_end.saturating_sub(at.stage_start);
        let stage_elapsed = elapsed.saturating_sub(at.stage_start);

        let start_i = at.start_target as i128;
        let delta = at.end_target as i128 - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = (stage_duration.as_nanos() as i128).max(1);

        // Integer division truncates toward zero, i.e. toward the stage start.
        let cur = start_i + delta.saturating_mul(num) / den;
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> StageSnapshot {
        let total = self.total_duration();
        let at = if elapsed >= total {
            self.locate(total.saturating_sub(Duration::from_nanos(1)))
        } else {
            self.locate(elapsed)
        };

        let clamped = elapsed.min(total);
        let stage_duration = at.stage_end.saturating_sub(at.stage_start);
        let stage_elapsed = clamped.saturating_sub(at.stage_start).min(stage_duration);

        StageSnapshot {
            stage: at.index + 1,
            stages: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target: at.start_target,
            end_target: at.end_target,
            current_target: self.desired_vus(clamped),
        }
    }
}
