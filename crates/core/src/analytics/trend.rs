use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Upward,
    Downward,
    Flat,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upward => "upward",
            Self::Downward => "downward",
            Self::Flat => "flat",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrendSettings {
    /// Number of most recent observations the trend needs.
    pub observations: usize,
    pub alpha: f64,
    /// Absolute revenue distance from the EMA still considered flat.
    pub threshold: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self { observations: 14, alpha: 0.1, threshold: 0.05 }
    }
}

/// Classifies daily revenue given newest first. Only the first
/// `settings.observations` values are read; fewer than that is flat.
pub fn classify(newest_first: &[f64], settings: &TrendSettings) -> Trend {
    if settings.observations == 0 || newest_first.len() < settings.observations {
        return Trend::Flat;
    }
    let recent = &newest_first[..settings.observations];
    let latest = recent[0];

    let mut ema = latest;
    for value in &recent[1..] {
        ema = settings.alpha * value + (1.0 - settings.alpha) * ema;
    }

    if (latest - ema).abs() <= settings.threshold {
        Trend::Flat
    } else if latest > ema {
        Trend::Upward
    } else {
        Trend::Downward
    }
}
