use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::models::{
    CycleRecord, FertileWindow, FertilityDay, PredictionResult, TemperatureReading,
    TemperatureShift,
};

pub const DEFAULT_LUTEAL_PHASE_DAYS: u32 = 14;
pub const DEFAULT_FERTILE_DAYS_BEFORE_OVULATION: u32 = 5;
pub const DEFAULT_MIN_CYCLES: usize = 3;
pub const DEFAULT_HISTORY_LIMIT: usize = 12;

/// Readings averaged on each side of a candidate day.
const SHIFT_WINDOW: usize = 3;
const MIN_TEMPERATURE_READINGS: usize = 7;
/// Rise in degrees Celsius that must be exceeded to count as a shift.
const SHIFT_THRESHOLD_CELSIUS: f64 = 0.2;
/// Readings are taken to hundredths, so differences below this are rounding noise.
const SHIFT_TOLERANCE: f64 = 1e-9;

/// Average-based forecaster over a user's cycle history.
///
/// History is expected most recent first. The first record is the current
/// cycle whether or not it is complete; only records with a known
/// `cycle_length` contribute to the average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePredictor {
    luteal_phase_days: u32,
    fertile_days_before_ovulation: u32,
    min_cycles: usize,
    history_limit: usize,
}

impl Default for CyclePredictor {
    fn default() -> Self {
        Self {
            luteal_phase_days: DEFAULT_LUTEAL_PHASE_DAYS,
            fertile_days_before_ovulation: DEFAULT_FERTILE_DAYS_BEFORE_OVULATION,
            min_cycles: DEFAULT_MIN_CYCLES,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CyclePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_luteal_phase_days(mut self, days: u32) -> Self {
        self.luteal_phase_days = days;
        self
    }

    pub fn with_fertile_days_before_ovulation(mut self, days: u32) -> Self {
        self.fertile_days_before_ovulation = days;
        self
    }

    pub fn with_min_cycles(mut self, cycles: usize) -> Self {
        self.min_cycles = cycles.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn luteal_phase_days(&self) -> u32 {
        self.luteal_phase_days
    }

    /// Forecast the next period, ovulation and fertile window.
    /// Returns `None` until `min_cycles` completed cycles are known.
    pub fn compute_forecast(&self, history: &[CycleRecord]) -> Option<PredictionResult> {
        let recent = &history[..history.len().min(self.history_limit)];
        let current = recent.first()?;

        let cycle_lengths: Vec<f64> = recent
            .iter()
            .filter_map(|c| c.cycle_length)
            .map(f64::from)
            .collect();

        if cycle_lengths.len() < self.min_cycles {
            debug!(
                completed = cycle_lengths.len(),
                required = self.min_cycles,
                "not enough completed cycles to forecast"
            );
            return None;
        }

        let avg_cycle_length = mean(&cycle_lengths);
        let next_period_date = add_days(current.start_date, avg_cycle_length.round() as i64)?;
        let ovulation_date = add_days(next_period_date, -i64::from(self.luteal_phase_days))?;
        let fertile_window = FertileWindow {
            start: add_days(
                ovulation_date,
                -i64::from(self.fertile_days_before_ovulation),
            )?,
            end: ovulation_date,
        };

        debug!(
            avg_cycle_length,
            sample_size = cycle_lengths.len(),
            %next_period_date,
            %ovulation_date,
            "computed cycle forecast"
        );

        Some(PredictionResult {
            next_period_date,
            ovulation_date,
            fertile_window,
            avg_cycle_length,
            luteal_phase_days: self.luteal_phase_days,
            sample_size: cycle_lengths.len(),
        })
    }

    /// Day-by-day fertility outlook across the forecast fertile window.
    pub fn fertility_forecast(&self, history: &[CycleRecord]) -> Vec<FertilityDay> {
        self.compute_forecast(history)
            .map(|prediction| fertility_days(&prediction))
            .unwrap_or_default()
    }
}

/// Fertility score (0-100) for a date. Zero outside the fertile window;
/// inside it the score rises linearly towards ovulation, never below 10.
pub fn fertility_score(prediction: &PredictionResult, date: NaiveDate) -> u8 {
    let window = &prediction.fertile_window;
    if !window.contains(date) {
        return 0;
    }

    let window_len = window.len_days();
    if window_len == 0 {
        return 100;
    }

    let days_from_start = (date - window.start).num_days() as f64;
    let score = (days_from_start / window_len as f64 * 100.0).round();
    score.clamp(10.0, 100.0) as u8
}

/// One entry per day of the fertile window, inclusive on both ends.
pub fn fertility_days(prediction: &PredictionResult) -> Vec<FertilityDay> {
    let window = prediction.fertile_window;
    window
        .start
        .iter_days()
        .take_while(|date| *date <= window.end)
        .map(|date| FertilityDay {
            date,
            score: fertility_score(prediction, date),
            is_ovulation: date == prediction.ovulation_date,
        })
        .collect()
}

/// Find the first day whose following three readings average more than
/// 0.2 °C above the three before it. Readings may arrive in any order.
///
/// Needs at least seven readings. Only days with three readings on each side
/// are candidates.
pub fn detect_ovulation(readings: &[TemperatureReading]) -> Option<TemperatureShift> {
    if readings.len() < MIN_TEMPERATURE_READINGS {
        return None;
    }

    let mut sorted = readings.to_vec();
    sorted.sort_by_key(|r| r.date);
    let temps: Vec<f64> = sorted.iter().map(|r| r.celsius).collect();

    (SHIFT_WINDOW..temps.len() - SHIFT_WINDOW).find_map(|i| {
        let before = mean(&temps[i - SHIFT_WINDOW..i]);
        let after = mean(&temps[i..i + SHIFT_WINDOW]);
        let shift = after - before;
        if shift - SHIFT_THRESHOLD_CELSIUS > SHIFT_TOLERANCE {
            debug!(date = %sorted[i].date, shift, "temperature shift detected");
            Some(TemperatureShift {
                date: sorted[i].date,
                shift_celsius: (shift * 100.0).round() / 100.0,
            })
        } else {
            None
        }
    })
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
