use crate::collate;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// Number of metrics that feed the average. `attendance` is tracked but excluded.
pub const AVERAGED_METRIC_COUNT: usize = 5;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// Accepts any JSON value; only finite numbers survive; everything else is absent.
fn lenient_metric<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_f64().filter(|v| v.is_finite()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default, deserialize_with = "lenient_metric")]
    pub exam_a: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub exam_b: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub internal_exams: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub external_exams: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub digital_platforms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_metric")]
    pub attendance: Option<f64>,
}

impl Metrics {
    #[cfg(test)]
    pub fn uniform(value: f64) -> Self {
        Self {
            exam_a: Some(value),
            exam_b: Some(value),
            internal_exams: Some(value),
            external_exams: Some(value),
            digital_platforms: Some(value),
            attendance: Some(value),
        }
    }

    /// The five metrics that make up the average, in a fixed order.
    pub fn averaged(&self) -> [Option<f64>; AVERAGED_METRIC_COUNT] {
        [
            self.exam_a,
            self.exam_b,
            self.internal_exams,
            self.external_exams,
            self.digital_platforms,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub metrics: Metrics,
    pub average_score: u8,
    pub rank: u32,
}

impl RankedStudent {
    #[cfg(test)]
    pub fn to_record(&self) -> StudentRecord {
        StudentRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            metrics: self.metrics.clone(),
            rank: Some(self.rank),
        }
    }
}

/// How the average's denominator is chosen.
///
/// `Fixed` always divides by five. `PresentMetrics` divides by the number of
/// metrics that hold a number, or by one when none do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreDenominator {
    #[default]
    Fixed,
    #[serde(alias = "present")]
    PresentMetrics,
}

impl ScoreDenominator {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreDenominator::Fixed => "fixed",
            ScoreDenominator::PresentMetrics => "present",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(ScoreDenominator::Fixed),
            "present" | "presentmetrics" => Some(ScoreDenominator::PresentMetrics),
            _ => None,
        }
    }
}

/// Half-up rounding to an integer, `Math.round` style.
///
/// Works from the floor rather than `(x + 0.5).floor()`, which rounds values
/// just below one half up through float error.
pub fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

pub fn clamp_score(v: f64) -> f64 {
    v.clamp(SCORE_MIN, SCORE_MAX)
}

pub fn average_score(metrics: &Metrics, denominator: ScoreDenominator) -> u8 {
    let values = metrics.averaged();
    let sum: f64 = values.iter().map(|v| v.map(clamp_score).unwrap_or(0.0)).sum();
    let denom = match denominator {
        ScoreDenominator::Fixed => AVERAGED_METRIC_COUNT,
        ScoreDenominator::PresentMetrics => values.iter().filter(|v| v.is_some()).count().max(1),
    };
    clamp_score(round_half_up(sum / denom as f64)) as u8
}

fn ranking_order(a: &RankedStudent, b: &RankedStudent) -> Ordering {
    b.average_score
        .cmp(&a.average_score)
        .then_with(|| collate::compare_names(&a.name, &b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Scores, sorts and ranks a snapshot. The input is left untouched.
pub fn compute_ranking(
    students: &[StudentRecord],
    denominator: ScoreDenominator,
) -> Vec<RankedStudent> {
    let mut ranked: Vec<RankedStudent> = students
        .iter()
        .map(|s| RankedStudent {
            id: s.id.clone(),
            name: s.name.clone(),
            email: s.email.clone(),
            metrics: s.metrics.clone(),
            average_score: average_score(&s.metrics, denominator),
            rank: 0,
        })
        .collect();
    ranked.sort_by(ranking_order);
    for (idx, r) in ranked.iter_mut().enumerate() {
        r.rank = (idx + 1) as u32;
    }
    ranked
}

pub fn refresh_current_user_rank<'a>(
    ranked: &'a [RankedStudent],
    current_user_id: &str,
) -> Option<&'a RankedStudent> {
    ranked.iter().find(|r| r.id == current_user_id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Podium<'a> {
    pub first: &'a RankedStudent,
    pub second: &'a RankedStudent,
    pub third: &'a RankedStudent,
}

/// Top three, only once there are at least three ranked students.
pub fn podium(ranked: &[RankedStudent]) -> Option<Podium<'_>> {
    match ranked {
        [first, second, third, ..] => Some(Podium {
            first,
            second,
            third,
        }),
        _ => None,
    }
}
