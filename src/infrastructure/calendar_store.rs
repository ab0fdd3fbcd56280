use crate::domain::models::{Calendar, DayPlan};
use crate::infrastructure::error::InfraError;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence boundary for legalized calendars, keyed by user and date.
pub trait CalendarStore: Send + Sync {
    fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DayPlan>, InfraError>;
    /// Upserts every day of `calendar`; days already stored for other dates are kept.
    fn save(&self, user_id: &str, calendar: &Calendar) -> Result<(), InfraError>;
    /// All stored days for the user in date order, with the summary of the last save.
    fn latest(&self, user_id: &str) -> Result<Calendar, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCalendarStore {
    db_path: PathBuf,
}

impl SqliteCalendarStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl CalendarStore for SqliteCalendarStore {
    fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DayPlan>, InfraError> {
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM day_plans WHERE user_id = ?1 AND plan_date = ?2",
                params![user_id, date.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|raw| serde_json::from_str::<DayPlan>(&raw).map_err(InfraError::from))
            .transpose()
    }

    fn save(&self, user_id: &str, calendar: &Calendar) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let updated_at = Utc::now().to_rfc3339();
        transaction.execute(
            "INSERT INTO calendars (user_id, summary, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               summary = excluded.summary,
               updated_at = excluded.updated_at",
            params![user_id, calendar.summary, updated_at],
        )?;
        for day in &calendar.days {
            let payload = serde_json::to_string(day)?;
            transaction.execute(
                "INSERT INTO day_plans (user_id, plan_date, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, plan_date) DO UPDATE SET
                   payload = excluded.payload,
                   updated_at = excluded.updated_at",
                params![user_id, day.date.to_string(), payload, updated_at],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    fn latest(&self, user_id: &str) -> Result<Calendar, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT payload FROM day_plans WHERE user_id = ?1 ORDER BY plan_date ASC",
        )?;
        let rows = statement.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut days = Vec::new();
        for raw in rows {
            days.push(serde_json::from_str::<DayPlan>(&raw?)?);
        }

        let summary: Option<String> = connection
            .query_row(
                "SELECT summary FROM calendars WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Calendar {
            summary: summary.unwrap_or_default(),
            days,
        })
    }
}

#[derive(Debug, Default)]
struct StoredCalendar {
    summary: String,
    days: BTreeMap<NaiveDate, DayPlan>,
}

#[derive(Debug, Default)]
pub struct InMemoryCalendarStore {
    calendars: Mutex<HashMap<String, StoredCalendar>>,
}

impl InMemoryCalendarStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredCalendar>>, InfraError> {
        self.calendars
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("calendar store lock poisoned: {error}")))
    }
}

impl CalendarStore for InMemoryCalendarStore {
    fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DayPlan>, InfraError> {
        let calendars = self.lock()?;
        Ok(calendars
            .get(user_id)
            .and_then(|stored| stored.days.get(&date))
            .cloned())
    }

    fn save(&self, user_id: &str, calendar: &Calendar) -> Result<(), InfraError> {
        let mut calendars = self.lock()?;
        let stored = calendars.entry(user_id.to_string()).or_default();
        stored.summary = calendar.summary.clone();
        for day in &calendar.days {
            stored.days.insert(day.date, day.clone());
        }
        Ok(())
    }

    fn latest(&self, user_id: &str) -> Result<Calendar, InfraError> {
        let calendars = self.lock()?;
        Ok(calendars
            .get(user_id)
            .map(|stored| Calendar {
                summary: stored.summary.clone(),
                days: stored.days.values().cloned().collect(),
            })
            .unwrap_or_default())
    }
}
