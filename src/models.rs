use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account the history belongs to. Nothing in the crate aggregates across users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One menstrual cycle, starting on the first day of flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    pub id: Uuid,
    pub start_date: NaiveDate,
    /// Days until the next cycle starts. `None` while the cycle is in progress.
    pub cycle_length: Option<u32>,
    pub period_length: Option<u32>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            cycle_length: None,
            period_length: None,
            symptoms: Vec::new(),
            notes: String::new(),
        }
    }
}

/// A cycle record as it arrives from persistence or import, before validation.
/// Every field is optional and lengths are signed so bad data can be detected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCycleRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub cycle_length: Option<i64>,
    #[serde(default)]
    pub period_length: Option<i64>,
    #[serde(default)]
    pub symptoms: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<&CycleRecord> for RawCycleRecord {
    fn from(record: &CycleRecord) -> Self {
        Self {
            id: Some(record.id),
            start_date: Some(record.start_date),
            cycle_length: record.cycle_length.map(i64::from),
            period_length: record.period_length.map(i64::from),
            symptoms: Some(record.symptoms.clone()),
            notes: Some(record.notes.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FertileWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FertileWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Span in days between the first and last fertile day.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Forecast derived from the cycle history. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub next_period_date: NaiveDate,
    pub ovulation_date: NaiveDate,
    pub fertile_window: FertileWindow,
    pub avg_cycle_length: f64,
    /// Luteal phase the forecast assumed, which may differ from the user's setting.
    pub luteal_phase_days: u32,
    /// Completed cycles the average was taken over.
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertilityDay {
    pub date: NaiveDate,
    pub score: u8,
    pub is_ovulation: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsistencyLabel {
    Regular,
    SomewhatIrregular,
    Irregular,
}

impl ConsistencyLabel {
    pub fn from_variability(variability: u32) -> Self {
        match variability {
            0..=7 => Self::Regular,
            8..=14 => Self::SomewhatIrregular,
            _ => Self::Irregular,
        }
    }
}

impl fmt::Display for ConsistencyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "Regular",
            Self::SomewhatIrregular => "Somewhat Irregular",
            Self::Irregular => "Irregular",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleTrend {
    Stable,
    GettingLonger,
    GettingShorter,
    NotEnoughData,
}

impl fmt::Display for CycleTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "Stable",
            Self::GettingLonger => "Getting longer",
            Self::GettingShorter => "Getting shorter",
            Self::NotEnoughData => "Not enough data",
        })
    }
}

/// Window of history the statistics are computed over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TimeRange {
    ThreeMonths,
    SixMonths,
    TwelveMonths,
    #[default]
    All,
}

impl TimeRange {
    pub fn months(&self) -> Option<u32> {
        match self {
            Self::ThreeMonths => Some(3),
            Self::SixMonths => Some(6),
            Self::TwelveMonths => Some(12),
            Self::All => None,
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3m" | "3months" => Ok(Self::ThreeMonths),
            "6m" | "6months" => Ok(Self::SixMonths),
            "12m" | "1y" | "1year" => Ok(Self::TwelveMonths),
            "all" => Ok(Self::All),
            other => Err(format!("unknown time range '{other}' (expected 3m, 6m, 12m or all)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtremeCycle {
    pub length: u32,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatistics {
    pub total_cycles: usize,
    pub completed_cycles: usize,
    pub avg_cycle_length: f64,
    pub avg_period_length: Option<f64>,
    pub cycle_variability: u32,
    pub regularity_score: u8,
    pub consistency: ConsistencyLabel,
    pub longest_cycle: ExtremeCycle,
    pub shortest_cycle: ExtremeCycle,
    pub trend: CycleTrend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InsightKind {
    Regular,
    SlightlyIrregular,
    Irregular,
    Symptoms,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSettings {
    pub cycle_length: u32,
    pub period_length: u32,
    /// Stored for display. The forecast uses the predictor's own luteal phase.
    pub luteal_phase_days: u32,
    #[serde(default)]
    pub show_fertility: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            cycle_length: 28,
            period_length: 5,
            luteal_phase_days: 14,
            show_fertility: false,
        }
    }
}

/// Partial settings update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub cycle_length: Option<u32>,
    pub period_length: Option<u32>,
    pub luteal_phase_days: Option<u32>,
    pub show_fertility: Option<bool>,
}

impl UserSettings {
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(days) = update.cycle_length {
            self.cycle_length = days.clamp(21, 45);
        }
        if let Some(days) = update.period_length {
            self.period_length = days.clamp(1, 10);
        }
        if let Some(days) = update.luteal_phase_days {
            self.luteal_phase_days = days.clamp(10, 16);
        }
        if let Some(enabled) = update.show_fertility {
            self.show_fertility = enabled;
        }
    }
}

/// One basal body temperature reading, taken on waking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub date: NaiveDate,
    pub celsius: f64,
}

/// Sustained temperature rise marking likely ovulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureShift {
    /// First day of the higher readings.
    pub date: NaiveDate,
    /// Rise in degrees Celsius, to two decimals.
    pub shift_celsius: f64,
}

/// Explicit user correction of a recorded cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCorrection {
    pub cycle_length: Option<u32>,
    pub period_length: Option<u32>,
}

/// Everything stored for one user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserData {
    pub records: Vec<RawCycleRecord>,
    #[serde(default)]
    pub settings: UserSettings,
    #[serde(default)]
    pub temperatures: Vec<TemperatureReading>,
}
