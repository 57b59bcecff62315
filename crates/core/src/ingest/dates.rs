use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::IngestError;

/// Date layouts accepted in uploads, in the order they are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    Iso,
    Us,
    DayFirst,
}

impl DateFormat {
    pub const CANDIDATES: [DateFormat; 3] = [Self::Iso, Self::Us, Self::DayFirst];

    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Iso => "%Y-%m-%d",
            Self::Us => "%m/%d/%Y",
            Self::DayFirst => "%d/%m/%Y",
        }
    }

    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(date_portion(raw), self.pattern()).ok()
    }
}

/// Drops a trailing time component (`2024-01-05 13:45`, `2024-01-05T13:45:00`).
fn date_portion(raw: &str) -> &str {
    raw.trim().split(|c: char| c.is_whitespace() || c == 'T').next().unwrap_or_default()
}

/// Picks the first candidate format under which every value parses.
///
/// When none fits, the error quotes the first value rejected by the format
/// that came closest, which is the most useful row to show the uploader.
pub fn parse_uniform_dates(values: &[&str]) -> Result<(DateFormat, Vec<NaiveDate>), IngestError> {
    let mut closest: Option<(usize, &str)> = None;

    for format in DateFormat::CANDIDATES {
        let mut parsed = Vec::with_capacity(values.len());
        let mut first_failure = None;
        for value in values {
            match format.parse(value) {
                Some(date) => parsed.push(date),
                None if first_failure.is_none() => first_failure = Some(*value),
                None => {}
            }
        }

        match first_failure {
            None => return Ok((format, parsed)),
            Some(sample) => {
                let successes = parsed.len();
                if closest.map_or(true, |(best, _)| successes > best) {
                    closest = Some((successes, sample));
                }
            }
        }
    }

    let sample = closest.map(|(_, sample)| sample.trim().to_string()).unwrap_or_default();
    Err(IngestError::DateFormat { sample })
}
