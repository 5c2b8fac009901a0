use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest clip accepted, in seconds
pub const MAX_DURATION_SECS: f64 = 10.0;

/// Upper bound on extracted stills per request
pub const MAX_IMAGES: usize = 20;

/// Interval used when none (or a non-positive one) is supplied
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;

/// How sample timestamps are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// One frame every N seconds starting at t=0
    #[default]
    Interval,
    /// A fixed number of frames spread evenly through the clip interior
    Count,
}

impl SamplingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sampling mode `{0}` (expected `interval` or `count`)")]
pub struct ParseSamplingModeError(String);

impl FromStr for SamplingMode {
    type Err = ParseSamplingModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(Self::Interval),
            "count" => Ok(Self::Count),
            _ => Err(ParseSamplingModeError(s.to_string())),
        }
    }
}

/// User-facing sampling parameters, before they are checked against a clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    pub mode: SamplingMode,
    pub interval_secs: Option<f64>,
    pub frame_count: Option<i64>,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Interval,
            interval_secs: Some(DEFAULT_INTERVAL_SECS),
            frame_count: Some(5),
        }
    }
}

impl SamplingSettings {
    pub fn interval(interval_secs: f64) -> Self {
        Self {
            mode: SamplingMode::Interval,
            interval_secs: Some(interval_secs),
            frame_count: None,
        }
    }

    pub fn count(frame_count: i64) -> Self {
        Self {
            mode: SamplingMode::Count,
            interval_secs: None,
            frame_count: Some(frame_count),
        }
    }

    /// Compute sample timestamps for a clip of `duration` seconds
    pub fn plan(&self, duration: f64) -> SamplingPlan {
        let timestamps = match self.mode {
            SamplingMode::Interval => {
                let interval = match self.interval_secs {
                    Some(v) if v > 0.0 => v,
                    _ => DEFAULT_INTERVAL_SECS,
                };

                let mut timestamps = Vec::new();
                let mut t = 0.0;
                while t < duration && timestamps.len() < MAX_IMAGES {
                    timestamps.push(t);
                    t += interval;
                }
                timestamps
            }
            SamplingMode::Count => {
                let requested = match self.frame_count {
                    Some(n) if n > 0 => n as usize,
                    _ => 1,
                };
                let n = requested.min(MAX_IMAGES);

                // Interior points only: neither 0 nor `duration` is sampled
                let step = duration / (n + 1) as f64;
                (0..n).map(|i| step * (i + 1) as f64).collect()
            }
        };

        SamplingPlan { timestamps }
    }
}

/// Ordered sample timestamps in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    timestamps: Vec<f64>,
}

impl SamplingPlan {
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Frame index for each timestamp at the given frame rate (truncated)
    pub fn frame_indices(&self, fps: f64) -> Vec<u64> {
        self.timestamps.iter().map(|t| (t * fps) as u64).collect()
    }
}
