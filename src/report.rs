use crate::ranking::{self, Metrics, Podium, RankedStudent};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Fair,
    NeedsAttention,
}

impl PerformanceTier {
    pub fn for_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => PerformanceTier::Excellent,
            70..=89 => PerformanceTier::Good,
            50..=69 => PerformanceTier::Fair,
            _ => PerformanceTier::NeedsAttention,
        }
    }
}

/// Upper bounds are inclusive: 20 lands in the first band, 21 in the second.
pub const SCORE_BANDS: [(&str, u8, u8); 5] = [
    ("0-20", 0, 20),
    ("21-40", 21, 40),
    ("41-60", 41, 60),
    ("61-80", 61, 80),
    ("81-100", 81, 100),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandCount {
    pub label: &'static str,
    pub count: usize,
}

pub fn score_distribution(ranked: &[RankedStudent]) -> Vec<BandCount> {
    SCORE_BANDS
        .iter()
        .map(|&(label, lo, hi)| BandCount {
            label,
            count: ranked
                .iter()
                .filter(|r| (lo..=hi).contains(&r.average_score))
                .count(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAverages {
    pub exam_a: Option<u8>,
    pub exam_b: Option<u8>,
    pub internal_exams: Option<u8>,
    pub external_exams: Option<u8>,
    pub digital_platforms: Option<u8>,
    pub attendance: Option<u8>,
}

fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> Option<u8> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values.flatten() {
        sum += ranking::clamp_score(v);
        n += 1;
    }
    if n == 0 {
        return None;
    }
    Some(ranking::clamp_score(ranking::round_half_up(sum / n as f64)) as u8)
}

pub fn metric_averages(ranked: &[RankedStudent]) -> MetricAverages {
    let col = |f: fn(&Metrics) -> Option<f64>| {
        mean_of_present(ranked.iter().map(move |r| f(&r.metrics)))
    };
    MetricAverages {
        exam_a: col(|m| m.exam_a),
        exam_b: col(|m| m.exam_b),
        internal_exams: col(|m| m.internal_exams),
        external_exams: col(|m| m.external_exams),
        digital_platforms: col(|m| m.digital_platforms),
        attendance: col(|m| m.attendance),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview<'a> {
    pub total_students: usize,
    pub class_average: u8,
    pub metric_averages: MetricAverages,
    pub distribution: Vec<BandCount>,
    pub top_student: Option<&'a RankedStudent>,
    pub podium: Option<Podium<'a>>,
}

pub fn class_overview(ranked: &[RankedStudent]) -> ClassOverview<'_> {
    let class_average = if ranked.is_empty() {
        0
    } else {
        let sum: f64 = ranked.iter().map(|r| r.average_score as f64).sum();
        ranking::round_half_up(sum / ranked.len() as f64) as u8
    };
    ClassOverview {
        total_students: ranked.len(),
        class_average,
        metric_averages: metric_averages(ranked),
        distribution: score_distribution(ranked),
        top_student: ranked.first(),
        podium: ranking::podium(ranked),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport<'a> {
    pub student: &'a RankedStudent,
    pub tier: PerformanceTier,
    pub total_students: usize,
}

pub fn student_report<'a>(ranked: &'a [RankedStudent], student_id: &str) -> Option<StudentReport<'a>> {
    let student = ranking::refresh_current_user_rank(ranked, student_id)?;
    Some(StudentReport {
        student,
        tier: PerformanceTier::for_score(student.average_score),
        total_students: ranked.len(),
    })
}
