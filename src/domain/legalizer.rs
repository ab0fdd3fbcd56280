use crate::domain::models::{
    Calendar, CandidateCalendar, CandidateDay, CandidateEntry, DayPlan, MAX_DIFFICULTY,
    MIN_DIFFICULTY, StudyBlock, TimeWindow, parse_date, parse_time_range,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegalizerPolicy {
    /// Drop days strictly before `today`. Only honoured when `today` is set.
    pub drop_past_entries: bool,
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    InvalidDate,
    PastDate,
    MalformedEntry,
    InvalidTimeRange,
    ForbiddenOverlap,
    IntraDayOverlap,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidDate => "invalid_date",
            Self::PastDate => "past_date",
            Self::MalformedEntry => "malformed_entry",
            Self::InvalidTimeRange => "invalid_time_range",
            Self::ForbiddenOverlap => "forbidden_overlap",
            Self::IntraDayOverlap => "intra_day_overlap",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegalizationReport {
    pub dropped_days: BTreeMap<DropReason, usize>,
    pub dropped_entries: BTreeMap<DropReason, usize>,
    pub kept_entries: usize,
}

impl LegalizationReport {
    pub fn total_dropped_entries(&self) -> usize {
        self.dropped_entries.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.dropped_days.is_empty() && self.dropped_entries.is_empty()
    }

    fn drop_day(&mut self, reason: DropReason, day: &CandidateDay) {
        tracing::debug!(?reason, date = ?day.date, entries = day.entries.len(), "dropping day");
        *self.dropped_days.entry(reason).or_default() += 1;
    }

    fn drop_entry(&mut self, reason: DropReason, date: NaiveDate, entry: &CandidateEntry) {
        tracing::debug!(
            ?reason,
            %date,
            time_allotted = ?entry.time_allotted,
            task_name = ?entry.task_name,
            "dropping entry"
        );
        *self.dropped_entries.entry(reason).or_default() += 1;
    }
}

/// Turns an untrusted candidate calendar into one that satisfies the calendar
/// invariants: valid dates in strictly increasing order, well-formed entries
/// with `start < end`, no overlap with a forbidden window or with another entry
/// of the same day, and priorities `1..=n` per day in surviving order.
///
/// Violations are filtered out, never repaired and never raised.
#[derive(Debug, Clone, Default)]
pub struct Legalizer {
    policy: LegalizerPolicy,
}

impl Legalizer {
    pub fn new(policy: LegalizerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LegalizerPolicy {
        &self.policy
    }

    pub fn legalize(&self, candidate: &CandidateCalendar, forbidden: &[TimeWindow]) -> Calendar {
        self.legalize_with_report(candidate, forbidden).0
    }

    pub fn legalize_with_report(
        &self,
        candidate: &CandidateCalendar,
        forbidden: &[TimeWindow],
    ) -> (Calendar, LegalizationReport) {
        let mut report = LegalizationReport::default();
        let mut days: BTreeMap<NaiveDate, DayPlan> = BTreeMap::new();

        for candidate_day in &candidate.days {
            let Some(date) = candidate_day.date.as_deref().and_then(parse_date) else {
                report.drop_day(DropReason::InvalidDate, candidate_day);
                continue;
            };
            if self.is_past(date) {
                report.drop_day(DropReason::PastDate, candidate_day);
                continue;
            }

            let day = days.entry(date).or_insert_with(|| DayPlan {
                date,
                entries: Vec::new(),
                notes: None,
            });
            if day.notes.is_none() {
                day.notes = candidate_day
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .map(ToOwned::to_owned);
            }

            for entry in &candidate_day.entries {
                match legal_entry(date, entry, forbidden, &day.entries) {
                    Ok(block) => day.entries.push(block),
                    Err(reason) => report.drop_entry(reason, date, entry),
                }
            }
        }

        let days = days
            .into_values()
            .filter(|day| !day.entries.is_empty())
            .map(renumber_priorities)
            .collect::<Vec<_>>();
        report.kept_entries = days.iter().map(|day| day.entries.len()).sum();

        let calendar = Calendar {
            summary: candidate
                .summary
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            days,
        };
        (calendar, report)
    }

    fn is_past(&self, date: NaiveDate) -> bool {
        self.policy.drop_past_entries && self.policy.today.is_some_and(|today| date < today)
    }
}

/// Convenience wrapper using the default policy.
pub fn legalize(candidate: &CandidateCalendar, forbidden: &[TimeWindow]) -> Calendar {
    Legalizer::default().legalize(candidate, forbidden)
}

fn legal_entry(
    date: NaiveDate,
    entry: &CandidateEntry,
    forbidden: &[TimeWindow],
    accepted: &[StudyBlock],
) -> Result<StudyBlock, DropReason> {
    let task_name = required_text(entry.task_name.as_deref())?;
    let subject_name = required_text(entry.subject_name.as_deref())?;
    let difficulty = entry
        .difficulty
        .filter(|value| (i64::from(MIN_DIFFICULTY)..=i64::from(MAX_DIFFICULTY)).contains(value))
        .ok_or(DropReason::MalformedEntry)? as u8;
    let time_allotted = required_text(entry.time_allotted.as_deref())?;
    let (start_minute, end_minute) =
        parse_time_range(time_allotted).ok_or(DropReason::InvalidTimeRange)?;

    if forbidden
        .iter()
        .any(|window| window.overlaps(start_minute, end_minute))
    {
        return Err(DropReason::ForbiddenOverlap);
    }

    let block = StudyBlock {
        date,
        start_minute,
        end_minute,
        task_name: task_name.to_string(),
        subject_name: subject_name.to_string(),
        difficulty,
        priority: 1,
    };
    if accepted.iter().any(|other| other.overlaps(&block)) {
        return Err(DropReason::IntraDayOverlap);
    }
    Ok(block)
}

fn required_text(value: Option<&str>) -> Result<&str, DropReason> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(DropReason::MalformedEntry)
}

fn renumber_priorities(mut day: DayPlan) -> DayPlan {
    for (index, entry) in day.entries.iter_mut().enumerate() {
        entry.priority = index as u32 + 1;
    }
    day
}
