use crate::domain::allocator::{AllocationSettings, Allocator};
use crate::domain::legalizer::{Legalizer, LegalizerPolicy};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const PLANNER_JSON: &str = "planner.json";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_MAX_CONCURRENCY: usize = 8;
const MAX_HORIZON_DAYS: u64 = 366;
const MAX_SAFETY_MARGIN_HOURS: f64 = 24.0 * 7.0;

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([(
        PLANNER_JSON,
        serde_json::json!({
            "schema": 1,
            "timezone": DEFAULT_TIMEZONE,
            "allocation": {
                "maxHoursPerDay": 2.0,
                "dayStartHour": 18,
                "horizonCapDays": 30,
                "safetyMarginHours": 2.0
            },
            "legalization": {
                "dropPastEntries": false
            },
            "generation": {
                "maxConcurrency": DEFAULT_MAX_CONCURRENCY
            }
        }),
    )])
}

/// Explicit planner configuration handed to the allocator and legalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub timezone: Tz,
    pub allocation: AllocationSettings,
    pub drop_past_entries: bool,
    pub max_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            allocation: AllocationSettings::default(),
            drop_past_entries: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl PlannerConfig {
    /// Wall-clock time in the configured timezone.
    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.timezone).naive_local()
    }

    pub fn allocator(&self) -> Allocator {
        Allocator::new(self.allocation.clone())
    }

    pub fn legalizer(&self, now: DateTime<Utc>) -> Legalizer {
        Legalizer::new(LegalizerPolicy {
            drop_past_entries: self.drop_past_entries,
            today: Some(self.local_now(now).date()),
        })
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_planner_config(config_dir: &Path) -> Result<PlannerConfig, InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    let raw = read_config(&path)?;
    parse_planner_config(&raw)
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {}", path.display())))
}

fn parse_planner_config(raw: &serde_json::Value) -> Result<PlannerConfig, String> {
    let mut config = PlannerConfig::default();

    if let Some(name) = raw
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config.timezone = name
            .parse::<Tz>()
            .map_err(|_| format!("unknown timezone '{name}'"))?;
    }

    if let Some(allocation) = raw.get("allocation") {
        if let Some(value) = allocation.get("maxHoursPerDay") {
            let hours = value
                .as_f64()
                .filter(|hours| *hours > 0.0 && *hours <= 24.0)
                .ok_or("allocation.maxHoursPerDay must be within (0, 24]")?;
            config.allocation.max_hours_per_day = hours;
        }
        if let Some(value) = allocation.get("dayStartHour") {
            let hour = value
                .as_u64()
                .filter(|hour| *hour <= 23)
                .ok_or("allocation.dayStartHour must be within 0..=23")?;
            config.allocation.day_start_hour = hour as u32;
        }
        if let Some(value) = allocation.get("horizonCapDays") {
            let days = value
                .as_u64()
                .filter(|days| *days <= MAX_HORIZON_DAYS)
                .ok_or_else(|| format!("allocation.horizonCapDays must be within 0..={MAX_HORIZON_DAYS}"))?;
            config.allocation.horizon_cap_days = days as u32;
        }
        if let Some(value) = allocation.get("safetyMarginHours") {
            let hours = value
                .as_f64()
                .filter(|hours| (0.0..=MAX_SAFETY_MARGIN_HOURS).contains(hours))
                .ok_or("allocation.safetyMarginHours must be within 0..=168")?;
            config.allocation.safety_margin_hours = hours;
        }
    }

    if let Some(value) = raw
        .get("legalization")
        .and_then(|legalization| legalization.get("dropPastEntries"))
    {
        config.drop_past_entries = value
            .as_bool()
            .ok_or("legalization.dropPastEntries must be a boolean")?;
    }

    if let Some(value) = raw
        .get("generation")
        .and_then(|generation| generation.get("maxConcurrency"))
    {
        let limit = value
            .as_u64()
            .filter(|limit| *limit >= 1)
            .ok_or("generation.maxConcurrency must be >= 1")?;
        config.max_concurrency = (limit as usize).min(DEFAULT_MAX_CONCURRENCY);
    }

    Ok(config)
}

pub fn save_planner_config(config_dir: &Path, config: &PlannerConfig) -> Result<(), InfraError> {
    let value = serde_json::json!({
        "schema": 1,
        "timezone": config.timezone.name(),
        "allocation": {
            "maxHoursPerDay": config.allocation.max_hours_per_day,
            "dayStartHour": config.allocation.day_start_hour,
            "horizonCapDays": config.allocation.horizon_cap_days,
            "safetyMarginHours": config.allocation.safety_margin_hours
        },
        "legalization": {
            "dropPastEntries": config.drop_past_entries
        },
        "generation": {
            "maxConcurrency": config.max_concurrency
        }
    });
    let formatted = serde_json::to_string_pretty(&value)?;
    fs::write(config_dir.join(PLANNER_JSON), format!("{formatted}\n"))?;
    Ok(())
}
