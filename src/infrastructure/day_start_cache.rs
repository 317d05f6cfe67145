use crate::infrastructure::day_start_repository::DayStartRepository;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Write-through shadow of the persisted day starts. Reads hit memory first;
/// writes go to the store before the shadow is updated.
pub struct DayStartCache {
    store: Arc<dyn DayStartRepository>,
    entries: Mutex<HashMap<NaiveDate, DateTime<Utc>>>,
}

impl DayStartCache {
    pub fn new(store: Arc<dyn DayStartRepository>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<NaiveDate, DateTime<Utc>>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("day start cache lock poisoned: {error}")))
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<DateTime<Utc>>, InfraError> {
        if let Some(cached) = self.lock()?.get(&date).copied() {
            return Ok(Some(cached));
        }
        let loaded = self.store.load(date)?;
        if let Some(start_at) = loaded {
            self.lock()?.insert(date, start_at);
        }
        Ok(loaded)
    }

    pub fn set(&self, date: NaiveDate, start_at: DateTime<Utc>) -> Result<(), InfraError> {
        self.store.save(date, start_at)?;
        self.lock()?.insert(date, start_at);
        Ok(())
    }
}
