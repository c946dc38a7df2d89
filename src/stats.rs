use chrono::{Months, NaiveDate};
use tracing::debug;

use crate::models::{
    ConsistencyLabel, CycleRecord, CycleStatistics, CycleTrend, ExtremeCycle, Insight,
    InsightKind, TimeRange,
};
use crate::prediction::mean;

/// Regularity points lost per day of variability.
const REGULARITY_PENALTY_PER_DAY: i64 = 5;
const TREND_RECENT_CYCLES: usize = 3;
const TREND_THRESHOLD_DAYS: f64 = 2.0;
const TOP_SYMPTOMS: usize = 3;

/// Statistics over the records inside `range`, relative to today's local date.
pub fn compute_statistics(history: &[CycleRecord], range: TimeRange) -> Option<CycleStatistics> {
    compute_statistics_at(history, range, chrono::Local::now().date_naive())
}

/// Statistics over the records inside `range`, relative to `today`.
///
/// Records still in progress count towards `total_cycles` only. Returns `None`
/// when no completed cycle falls inside the range.
pub fn compute_statistics_at(
    history: &[CycleRecord],
    range: TimeRange,
    today: NaiveDate,
) -> Option<CycleStatistics> {
    let in_range = filter_range(history, range, today);
    if in_range.is_empty() {
        return None;
    }

    let completed: Vec<(&CycleRecord, u32)> = in_range
        .iter()
        .filter_map(|c| c.cycle_length.map(|len| (*c, len)))
        .collect();
    if completed.is_empty() {
        debug!(total = in_range.len(), "no completed cycles in range");
        return None;
    }

    let cycle_lengths: Vec<f64> = completed.iter().map(|(_, len)| f64::from(*len)).collect();
    let period_lengths: Vec<f64> = in_range
        .iter()
        .filter_map(|c| c.period_length)
        .map(f64::from)
        .collect();

    let longest_cycle = extreme(&completed, |candidate, best| candidate > best)?;
    let shortest_cycle = extreme(&completed, |candidate, best| candidate < best)?;
    let cycle_variability = longest_cycle.length - shortest_cycle.length;

    Some(CycleStatistics {
        total_cycles: in_range.len(),
        completed_cycles: completed.len(),
        avg_cycle_length: one_decimal(mean(&cycle_lengths)),
        avg_period_length: if period_lengths.is_empty() {
            None
        } else {
            Some(one_decimal(mean(&period_lengths)))
        },
        cycle_variability,
        regularity_score: regularity_score(cycle_variability),
        consistency: ConsistencyLabel::from_variability(cycle_variability),
        longest_cycle,
        shortest_cycle,
        trend: trend_of(&cycle_lengths),
    })
}

/// `100 - 5 * variability`, clamped to 0..=100.
pub fn regularity_score(variability: u32) -> u8 {
    let score = 100 - i64::from(variability) * REGULARITY_PENALTY_PER_DAY;
    score.clamp(0, 100) as u8
}

/// Compare the three most recent completed cycles against all of them.
pub fn cycle_trend(history: &[CycleRecord]) -> CycleTrend {
    let lengths: Vec<f64> = history
        .iter()
        .filter_map(|c| c.cycle_length)
        .map(f64::from)
        .collect();
    trend_of(&lengths)
}

fn trend_of(lengths: &[f64]) -> CycleTrend {
    if lengths.len() < TREND_RECENT_CYCLES {
        return CycleTrend::NotEnoughData;
    }

    let recent = mean(&lengths[..TREND_RECENT_CYCLES]);
    let overall = mean(lengths);
    let difference = recent - overall;

    // A difference of exactly +2 is neither stable nor longer.
    if difference.abs() < TREND_THRESHOLD_DAYS {
        CycleTrend::Stable
    } else if difference > TREND_THRESHOLD_DAYS {
        CycleTrend::GettingLonger
    } else {
        CycleTrend::GettingShorter
    }
}

/// Regularity and symptom insights for the overview screen.
pub fn insights(history: &[CycleRecord]) -> Vec<Insight> {
    let mut insights = Vec::new();

    let lengths: Vec<u32> = history.iter().filter_map(|c| c.cycle_length).collect();
    if lengths.len() >= 3 {
        let max = lengths.iter().copied().max().unwrap_or(0);
        let min = lengths.iter().copied().min().unwrap_or(0);
        insights.push(regularity_insight(max - min));
    }

    let top = top_symptoms(history, TOP_SYMPTOMS);
    if !top.is_empty() {
        insights.push(Insight {
            kind: InsightKind::Symptoms,
            title: "Common Symptoms".into(),
            message: format!("You frequently experience: {}", top.join(", ")),
        });
    }

    insights
}

fn regularity_insight(variability: u32) -> Insight {
    match variability {
        0..=3 => Insight {
            kind: InsightKind::Regular,
            title: "Regular Cycle".into(),
            message: "Your cycle is very regular. Great for prediction accuracy!".into(),
        },
        4..=7 => Insight {
            kind: InsightKind::SlightlyIrregular,
            title: "Slightly Irregular".into(),
            message: format!(
                "Your cycle varies by {variability} days. Consider tracking additional symptoms."
            ),
        },
        _ => Insight {
            kind: InsightKind::Irregular,
            title: "Irregular Cycle".into(),
            message: "Your cycle varies significantly. Consult with a healthcare provider if concerned."
                .into(),
        },
    }
}

/// Most frequent symptoms, ties kept in order of first appearance.
fn top_symptoms(history: &[CycleRecord], limit: usize) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for symptom in history.iter().flat_map(|c| c.symptoms.iter()) {
        match counts.iter_mut().find(|(name, _)| *name == symptom.as_str()) {
            Some((_, count)) => *count += 1,
            None => counts.push((symptom.as_str(), 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Records that started after `today - N months`. The cutoff day itself is
/// excluded, as a range measured from the current moment would exclude it.
fn filter_range<'a>(
    history: &'a [CycleRecord],
    range: TimeRange,
    today: NaiveDate,
) -> Vec<&'a CycleRecord> {
    let cutoff = range
        .months()
        .and_then(|months| today.checked_sub_months(Months::new(months)));

    history
        .iter()
        .filter(|c| cutoff.map_or(true, |cutoff| c.start_date > cutoff))
        .collect()
}

/// First record, in input order, that no later record beats.
fn extreme(
    completed: &[(&CycleRecord, u32)],
    beats: impl Fn(u32, u32) -> bool,
) -> Option<ExtremeCycle> {
    let mut iter = completed.iter();
    let (first, first_len) = *iter.next()?;

    let (record, length) = iter.fold((first, first_len), |best, (candidate, len)| {
        if beats(*len, best.1) {
            (*candidate, *len)
        } else {
            best
        }
    });

    Some(ExtremeCycle {
        length,
        start_date: record.start_date,
    })
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
