use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::crypto::VaultKey;
use crate::history::{HistoryError, HistoryStore, MemoryHistoryStore, SubscriptionId};
use crate::models::*;
use crate::prediction::{self, CyclePredictor};
use crate::stats;
use crate::storage::{StorageError, Vault};

/// Most recent temperature readings considered for ovulation detection.
const TEMPERATURE_WINDOW: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is locked")]
    Locked,
    #[error("no data for user '{0}' yet, run init first")]
    NotSetUp(UserId),
    #[error("data for user '{0}' already exists")]
    AlreadySetUp(UserId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("session state lock poisoned")]
    Poisoned,
}

struct Unlocked {
    user: UserId,
    vault: Vault,
    key: VaultKey,
    settings: UserSettings,
    temperatures: Vec<TemperatureReading>,
    subscription: SubscriptionId,
}

/// One user's unlocked data plus the predictor that reads it.
///
/// The forecast is refreshed from every history snapshot the store publishes,
/// so [`Session::latest_forecast`] is always current without recomputing.
pub struct Session {
    data_dir: PathBuf,
    predictor: CyclePredictor,
    store: MemoryHistoryStore,
    state: Mutex<Option<Unlocked>>,
    latest: Arc<Mutex<Option<PredictionResult>>>,
}

impl Session {
    pub fn new(data_dir: impl Into<PathBuf>, predictor: CyclePredictor) -> Self {
        Self {
            data_dir: data_dir.into(),
            predictor,
            store: MemoryHistoryStore::new(),
            state: Mutex::new(None),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(config.data_dir()?, config.prediction.predictor()))
    }

    pub fn is_setup(&self, user: &UserId) -> Result<bool, SessionError> {
        Ok(Vault::new(&self.data_dir, user)?.exists())
    }

    /// Create an empty vault for `user` and unlock it.
    pub fn setup(&self, user: &UserId, passphrase: &str) -> Result<(), SessionError> {
        let vault = Vault::new(&self.data_dir, user)?;
        if vault.exists() {
            return Err(SessionError::AlreadySetUp(user.clone()));
        }

        let data = UserData::default();
        let key = vault.create(passphrase, &data)?;
        self.activate(user, vault, key, data)
    }

    pub fn unlock(&self, user: &UserId, passphrase: &str) -> Result<(), SessionError> {
        let vault = Vault::new(&self.data_dir, user)?;
        if !vault.exists() {
            return Err(SessionError::NotSetUp(user.clone()));
        }

        let (key, data) = vault.load(passphrase)?;
        self.activate(user, vault, key, data)
    }

    fn activate(
        &self,
        user: &UserId,
        vault: Vault,
        key: VaultKey,
        data: UserData,
    ) -> Result<(), SessionError> {
        self.lock()?;

        self.store.load(user, data.records)?;
        let latest = Arc::clone(&self.latest);
        let predictor = self.predictor;
        let subscription = self.store.subscribe(
            user,
            Box::new(move |history: &[CycleRecord]| {
                let forecast = predictor.compute_forecast(history);
                if let Ok(mut slot) = latest.lock() {
                    *slot = forecast;
                }
            }),
        )?;

        self.flag_luteal_mismatch(&data.settings);
        *self.state.lock().map_err(|_| SessionError::Poisoned)? = Some(Unlocked {
            user: user.clone(),
            vault,
            key,
            settings: data.settings,
            temperatures: data.temperatures,
            subscription,
        });

        info!(%user, "session unlocked");
        Ok(())
    }

    /// Drop the user's data and key from memory.
    pub fn lock(&self) -> Result<(), SessionError> {
        let unlocked = self.state.lock().map_err(|_| SessionError::Poisoned)?.take();
        if let Some(unlocked) = unlocked {
            self.store.unsubscribe(unlocked.subscription)?;
            self.store.clear(&unlocked.user)?;
            info!(user = %unlocked.user, "session locked");
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn user(&self) -> Result<UserId, SessionError> {
        self.with_unlocked(|u| Ok(u.user.clone()))
    }

    pub fn log_period(
        &self,
        start_date: NaiveDate,
        period_length: Option<u32>,
    ) -> Result<CycleRecord, SessionError> {
        self.write(|u| Ok(self.store.log_period_start(&u.user, start_date, period_length)?))
    }

    pub fn edit_notes(&self, id: Uuid, notes: &str) -> Result<CycleRecord, SessionError> {
        self.write(|u| Ok(self.store.update_notes(&u.user, id, notes)?))
    }

    pub fn correct_cycle(
        &self,
        id: Uuid,
        correction: CycleCorrection,
    ) -> Result<CycleRecord, SessionError> {
        self.write(|u| Ok(self.store.correct(&u.user, id, correction)?))
    }

    pub fn delete_cycle(&self, id: Uuid) -> Result<CycleRecord, SessionError> {
        self.write(|u| Ok(self.store.delete(&u.user, id)?))
    }

    /// Cycle history, most recent first.
    pub fn history(&self) -> Result<Vec<CycleRecord>, SessionError> {
        self.with_unlocked(|u| Ok(self.store.history(&u.user)?))
    }

    /// Forecast as of the last history snapshot.
    pub fn latest_forecast(&self) -> Result<Option<PredictionResult>, SessionError> {
        self.with_unlocked(|_| {
            let latest = self.latest.lock().map_err(|_| SessionError::Poisoned)?;
            Ok(latest.clone())
        })
    }

    pub fn forecast(&self) -> Result<Option<PredictionResult>, SessionError> {
        Ok(self.predictor.compute_forecast(&self.history()?))
    }

    pub fn fertility_forecast(&self) -> Result<Vec<FertilityDay>, SessionError> {
        Ok(self.predictor.fertility_forecast(&self.history()?))
    }

    pub fn statistics(&self, range: TimeRange) -> Result<Option<CycleStatistics>, SessionError> {
        Ok(stats::compute_statistics(&self.history()?, range))
    }

    pub fn trend(&self) -> Result<CycleTrend, SessionError> {
        Ok(stats::cycle_trend(&self.history()?))
    }

    pub fn insights(&self) -> Result<Vec<Insight>, SessionError> {
        Ok(stats::insights(&self.history()?))
    }

    pub fn settings(&self) -> Result<UserSettings, SessionError> {
        self.with_unlocked(|u| Ok(u.settings.clone()))
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<UserSettings, SessionError> {
        let settings = self.update(|u| {
            u.settings.apply(update);
            u.settings.clone()
        })?;
        self.flag_luteal_mismatch(&settings);
        Ok(settings)
    }

    /// Record the morning temperature for `date`, replacing any earlier reading that day.
    pub fn log_temperature(
        &self,
        date: NaiveDate,
        celsius: f64,
    ) -> Result<TemperatureReading, SessionError> {
        let reading = TemperatureReading { date, celsius };
        self.update(|u| {
            u.temperatures.retain(|r| r.date != date);
            let index = u.temperatures.partition_point(|r| r.date < date);
            u.temperatures.insert(index, reading);
        })?;
        info!(%date, celsius, "logged temperature");
        Ok(reading)
    }

    /// Temperature readings, oldest first.
    pub fn temperatures(&self) -> Result<Vec<TemperatureReading>, SessionError> {
        self.with_unlocked(|u| Ok(u.temperatures.clone()))
    }

    /// Ovulation as read from the last 30 temperature readings.
    pub fn detected_ovulation(&self) -> Result<Option<TemperatureShift>, SessionError> {
        self.with_unlocked(|u| {
            let recent = u.temperatures.len().saturating_sub(TEMPERATURE_WINDOW);
            Ok(prediction::detect_ovulation(&u.temperatures[recent..]))
        })
    }

    /// Delete the user's vault permanently and lock.
    pub fn wipe(&self) -> Result<(), SessionError> {
        let vault = self.with_unlocked(|u| Ok(u.vault.clone()))?;
        self.lock()?;
        vault.wipe()?;
        Ok(())
    }

    fn with_unlocked<T>(
        &self,
        f: impl FnOnce(&Unlocked) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let state = self.state.lock().map_err(|_| SessionError::Poisoned)?;
        let unlocked = state.as_ref().ok_or(SessionError::Locked)?;
        f(unlocked)
    }

    /// Run a history write and persist it. The history is rolled back if the
    /// vault cannot be written.
    fn write<T>(
        &self,
        f: impl FnOnce(&Unlocked) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        self.with_unlocked(|u| {
            let snapshot = self.store.history(&u.user)?;
            let result = f(u)?;
            if let Err(err) = self.save(u) {
                warn!(user = %u.user, error = %err, "save failed, rolling back history");
                self.store.replace(&u.user, snapshot)?;
                return Err(err);
            }
            Ok(result)
        })
    }

    /// Change settings or temperatures and persist them, rolling back on failure.
    fn update<T>(&self, f: impl FnOnce(&mut Unlocked) -> T) -> Result<T, SessionError> {
        let mut state = self.state.lock().map_err(|_| SessionError::Poisoned)?;
        let unlocked = state.as_mut().ok_or(SessionError::Locked)?;
        let settings = unlocked.settings.clone();
        let temperatures = unlocked.temperatures.clone();

        let result = f(unlocked);
        if let Err(err) = self.save(unlocked) {
            warn!(user = %unlocked.user, error = %err, "save failed, rolling back");
            unlocked.settings = settings;
            unlocked.temperatures = temperatures;
            return Err(err);
        }
        Ok(result)
    }

    fn save(&self, unlocked: &Unlocked) -> Result<(), SessionError> {
        let records = self
            .store
            .history(&unlocked.user)?
            .iter()
            .map(RawCycleRecord::from)
            .collect();
        let data = UserData {
            records,
            settings: unlocked.settings.clone(),
            temperatures: unlocked.temperatures.clone(),
        };
        unlocked.vault.save(&unlocked.key, &data)?;
        Ok(())
    }

    fn flag_luteal_mismatch(&self, settings: &UserSettings) {
        if settings.luteal_phase_days != self.predictor.luteal_phase_days() {
            warn!(
                user_setting = settings.luteal_phase_days,
                forecast_uses = self.predictor.luteal_phase_days(),
                "luteal phase setting differs from the one used for forecasts"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn locked_session_refuses_work() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path(), CyclePredictor::new());

        assert!(!session.is_unlocked());
        assert!(matches!(session.history(), Err(SessionError::Locked)));
        assert!(matches!(
            session.log_period(date("2024-01-01"), None),
            Err(SessionError::Locked)
        ));
        assert!(matches!(session.settings(), Err(SessionError::Locked)));
    }

    #[test]
    fn unlock_without_setup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path(), CyclePredictor::new());
        assert!(matches!(
            session.unlock(&UserId::new("alex"), "pw"),
            Err(SessionError::NotSetUp(_))
        ));
    }

    #[test]
    fn latest_forecast_follows_logged_periods() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path(), CyclePredictor::new());
        session.setup(&UserId::new("alex"), "pw").unwrap();

        for start in ["2023-11-04", "2023-12-03", "2024-01-01", "2024-01-29"] {
            assert!(session.latest_forecast().unwrap().is_none());
            session.log_period(date(start), Some(5)).unwrap();
        }

        let latest = session.latest_forecast().unwrap().unwrap();
        // 29, 29 and 28 days average to 28.67, rounded to 29
        assert_eq!(latest.next_period_date, date("2024-02-27"));
        assert_eq!(Some(latest), session.forecast().unwrap());

        session.lock().unwrap();
        assert!(matches!(session.latest_forecast(), Err(SessionError::Locked)));
    }

    /// Leave a directory where the vault file should be, so saves fail.
    fn block_vault(dir: &std::path::Path, user: &UserId) {
        let vault = Vault::new(dir, user).unwrap();
        std::fs::remove_file(vault.path()).unwrap();
        std::fs::create_dir(vault.path()).unwrap();
    }

    #[test]
    fn failed_save_rolls_back_history() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("alex");
        let session = Session::new(dir.path(), CyclePredictor::new());
        session.setup(&user, "pw").unwrap();
        for start in ["2023-11-04", "2023-12-03", "2024-01-01", "2024-01-29"] {
            session.log_period(date(start), Some(5)).unwrap();
        }
        let history = session.history().unwrap();
        let forecast = session.latest_forecast().unwrap();

        block_vault(dir.path(), &user);

        assert!(matches!(
            session.log_period(date("2024-02-26"), None),
            Err(SessionError::Storage(StorageError::Io(_)))
        ));
        assert!(session.delete_cycle(history[0].id).is_err());
        assert_eq!(session.history().unwrap(), history);
        assert_eq!(session.latest_forecast().unwrap(), forecast);
    }

    #[test]
    fn failed_save_rolls_back_settings_and_temperatures() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("alex");
        let session = Session::new(dir.path(), CyclePredictor::new());
        session.setup(&user, "pw").unwrap();
        session.log_temperature(date("2024-01-01"), 36.4).unwrap();

        block_vault(dir.path(), &user);

        let update = SettingsUpdate {
            cycle_length: Some(35),
            ..SettingsUpdate::default()
        };
        assert!(session.update_settings(&update).is_err());
        assert_eq!(session.settings().unwrap(), UserSettings::default());

        assert!(session.log_temperature(date("2024-01-02"), 36.5).is_err());
        assert_eq!(session.temperatures().unwrap().len(), 1);
    }

    #[test]
    fn temperatures_replace_same_day_and_stay_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path(), CyclePredictor::new());
        session.setup(&UserId::new("alex"), "pw").unwrap();

        session.log_temperature(date("2024-01-03"), 36.3).unwrap();
        session.log_temperature(date("2024-01-01"), 36.2).unwrap();
        session.log_temperature(date("2024-01-03"), 36.4).unwrap();

        let temps = session.temperatures().unwrap();
        let days: Vec<NaiveDate> = temps.iter().map(|r| r.date).collect();
        assert_eq!(days, vec![date("2024-01-01"), date("2024-01-03")]);
        assert_eq!(temps[1].celsius, 36.4);
        assert!(session.detected_ovulation().unwrap().is_none());
    }
}
