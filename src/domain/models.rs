use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MINUTES_PER_DAY: u16 = 24 * 60;
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// Separator used when rendering `time_allotted` ranges.
pub const RANGE_SEPARATOR: char = '–';

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    Written,
    Practical,
    Project,
    Assignment,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Practical => "practical",
            Self::Project => "project",
            Self::Assignment => "assignment",
        }
    }
}

/// A forbidden time-of-day interval, `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    start: u16,
    end: u16,
}

impl TimeWindow {
    pub fn new(start: u16, end: u16) -> Option<Self> {
        (start < end && end <= MINUTES_PER_DAY).then_some(Self { start, end })
    }

    /// True when `[start, end)` shares at least one minute with this window.
    pub fn overlaps(&self, start: u16, end: u16) -> bool {
        !(end <= self.start || start >= self.end)
    }

    pub fn as_hhmm_pair(&self) -> (String, String) {
        (format_minutes(self.start), format_minutes(self.end))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{RANGE_SEPARATOR}{}",
            format_minutes(self.start),
            format_minutes(self.end)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub title: String,
    #[serde(rename = "subject_name/project_name", alias = "subject_name")]
    pub subject_name: String,
    #[serde(rename = "type")]
    pub exam_type: ExamType,
    pub difficulty: u8,
    pub estimated_hours: f64,
    #[serde(default)]
    pub deadline: Option<NaiveDateTime>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.subject_name, "task.subject_name")?;
        validate_difficulty(i64::from(self.difficulty), "task.difficulty")?;
        if !self.estimated_hours.is_finite() || self.estimated_hours <= 0.0 {
            return Err("task.estimated_hours must be a positive number".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyBlock {
    pub date: NaiveDate,
    pub start_minute: u16,
    pub end_minute: u16,
    pub task_name: String,
    pub subject_name: String,
    pub difficulty: u8,
    pub priority: u32,
}

impl StudyBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.task_name, "block.task_name")?;
        validate_non_empty(&self.subject_name, "block.subject_name")?;
        if self.end_minute <= self.start_minute {
            return Err("block.end must be after block.start".to_string());
        }
        if self.end_minute > MINUTES_PER_DAY {
            return Err("block must not cross midnight".to_string());
        }
        validate_difficulty(i64::from(self.difficulty), "block.difficulty")?;
        if self.priority == 0 {
            return Err("block.priority must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }

    pub fn time_allotted(&self) -> String {
        format!(
            "{}{RANGE_SEPARATOR}{}",
            format_minutes(self.start_minute),
            format_minutes(self.end_minute)
        )
    }

    pub fn overlaps(&self, other: &StudyBlock) -> bool {
        !(self.end_minute <= other.start_minute || self.start_minute >= other.end_minute)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "DayPlanRecord", try_from = "DayPlanRecord")]
pub struct DayPlan {
    pub date: NaiveDate,
    pub entries: Vec<StudyBlock>,
    pub notes: Option<String>,
}

impl DayPlan {
    pub fn total_minutes(&self) -> u32 {
        self.entries
            .iter()
            .map(|entry| u32::from(entry.duration_minutes()))
            .sum()
    }
}

/// Canonical calendar document; serializes to the `{summary, calendar: [...]}` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Calendar {
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "calendar", default)]
    pub days: Vec<DayPlan>,
}

impl Calendar {
    pub fn day(&self, date: NaiveDate) -> Option<&DayPlan> {
        self.days.iter().find(|day| day.date == date)
    }

    pub fn entry_count(&self) -> usize {
        self.days.iter().map(|day| day.entries.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct DayPlanRecord {
    date: NaiveDate,
    #[serde(default)]
    entries: Vec<EntryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct EntryRecord {
    time_allotted: String,
    task_name: String,
    #[serde(rename = "subject_name/project_name")]
    subject_name: String,
    difficulty: u8,
    priority: u32,
}

impl From<DayPlan> for DayPlanRecord {
    fn from(day: DayPlan) -> Self {
        Self {
            date: day.date,
            entries: day
                .entries
                .into_iter()
                .map(|entry| EntryRecord {
                    time_allotted: entry.time_allotted(),
                    task_name: entry.task_name,
                    subject_name: entry.subject_name,
                    difficulty: entry.difficulty,
                    priority: entry.priority,
                })
                .collect(),
            notes: day.notes,
        }
    }
}

impl TryFrom<DayPlanRecord> for DayPlan {
    type Error = String;

    fn try_from(record: DayPlanRecord) -> Result<Self, Self::Error> {
        let date = record.date;
        let entries = record
            .entries
            .into_iter()
            .map(|entry| {
                let (start_minute, end_minute) = parse_time_range(&entry.time_allotted)
                    .ok_or_else(|| format!("invalid time_allotted '{}'", entry.time_allotted))?;
                Ok(StudyBlock {
                    date,
                    start_minute,
                    end_minute,
                    task_name: entry.task_name,
                    subject_name: entry.subject_name,
                    difficulty: entry.difficulty,
                    priority: entry.priority,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self {
            date,
            entries,
            notes: record.notes,
        })
    }
}

/// Untrusted calendar as produced by the generator. Every field is optional and
/// nothing here is assumed to satisfy any invariant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateCalendar {
    pub summary: Option<String>,
    pub days: Vec<CandidateDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateDay {
    pub date: Option<String>,
    pub entries: Vec<CandidateEntry>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateEntry {
    pub time_allotted: Option<String>,
    pub task_name: Option<String>,
    pub subject_name: Option<String>,
    pub difficulty: Option<i64>,
    pub priority: Option<i64>,
}

impl CandidateCalendar {
    /// Reads a calendar-shaped JSON object. Unknown or mistyped fields become
    /// `None` instead of failing, so the Legalizer decides what survives.
    /// Returns `None` when the value has no `calendar` array at all.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let days = value.get("calendar")?.as_array()?;
        Some(Self {
            summary: string_field(value, "summary"),
            days: days.iter().map(CandidateDay::from_json).collect(),
        })
    }
}

impl CandidateDay {
    fn from_json(value: &serde_json::Value) -> Self {
        let entries = value
            .get("entries")
            .and_then(serde_json::Value::as_array)
            .map(|entries| entries.iter().map(CandidateEntry::from_json).collect())
            .unwrap_or_default();
        Self {
            date: string_field(value, "date"),
            entries,
            notes: string_field(value, "notes"),
        }
    }
}

impl CandidateEntry {
    fn from_json(value: &serde_json::Value) -> Self {
        Self {
            time_allotted: string_field(value, "time_allotted"),
            task_name: string_field(value, "task_name"),
            subject_name: string_field(value, "subject_name/project_name")
                .or_else(|| string_field(value, "subject_name"))
                .or_else(|| string_field(value, "project_name")),
            difficulty: value.get("difficulty").and_then(serde_json::Value::as_i64),
            priority: value.get("priority").and_then(serde_json::Value::as_i64),
        }
    }
}

impl From<Calendar> for CandidateCalendar {
    fn from(calendar: Calendar) -> Self {
        Self {
            summary: Some(calendar.summary),
            days: calendar
                .days
                .into_iter()
                .map(|day| CandidateDay {
                    date: Some(day.date.format("%Y-%m-%d").to_string()),
                    entries: day
                        .entries
                        .into_iter()
                        .map(|entry| CandidateEntry {
                            time_allotted: Some(entry.time_allotted()),
                            task_name: Some(entry.task_name),
                            subject_name: Some(entry.subject_name),
                            difficulty: Some(i64::from(entry.difficulty)),
                            priority: Some(i64::from(entry.priority)),
                        })
                        .collect(),
                    notes: day.notes,
                })
                .collect(),
        }
    }
}

/// Fallback-plan element, one per allocated block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocatedBlock {
    pub date: NaiveDate,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub subject_title: String,
    pub subject_name: String,
    pub exam_type: ExamType,
    pub subtask_name: String,
    pub estimated_hours: f64,
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_difficulty(value: i64, field_name: &str) -> Result<(), String> {
    if !(i64::from(MIN_DIFFICULTY)..=i64::from(MAX_DIFFICULTY)).contains(&value) {
        return Err(format!(
            "{field_name} must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}"
        ));
    }
    Ok(())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parses `HH:MM` into minutes since midnight. `24:00` is accepted as the end of
/// the day so that ranges may close at midnight.
pub fn parse_time_of_day(value: &str) -> Option<u16> {
    let value = value.trim();
    if value == "24:00" {
        return Some(MINUTES_PER_DAY);
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M").ok()?;
    Some(minutes_of(time))
}

/// Parses `HH:MM–HH:MM` (en dash, em dash, hyphen or ` to `). Ranges whose end
/// is not after their start are rejected.
pub fn parse_time_range(value: &str) -> Option<(u16, u16)> {
    let value = value.trim();
    let (start, end) = value
        .split_once(['–', '—', '-'])
        .or_else(|| value.split_once(" to "))?;
    let start = parse_time_of_day(start)?;
    let end = parse_time_of_day(end)?;
    (start < end).then_some((start, end))
}

pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn minutes_of(time: NaiveTime) -> u16 {
    use chrono::Timelike;
    (time.hour() * 60 + time.minute()) as u16
}
