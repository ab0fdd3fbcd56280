use crate::domain::error::DomainError;
use crate::domain::models::{
    AllocatedBlock, Calendar, DayPlan, MINUTES_PER_DAY, StudyBlock, Task, minutes_of,
};
use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const MAX_SAFETY_MARGIN_HOURS: f64 = 24.0 * 7.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSettings {
    pub max_hours_per_day: f64,
    pub day_start_hour: u32,
    pub horizon_cap_days: u32,
    pub safety_margin_hours: f64,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            max_hours_per_day: 2.0,
            day_start_hour: 18,
            horizon_cap_days: 30,
            safety_margin_hours: 2.0,
        }
    }
}

/// A dated `[start_minute, end_minute)` slot produced by the greedy walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedSlot {
    pub date: NaiveDate,
    pub start_minute: u16,
    pub end_minute: u16,
}

impl AllocatedSlot {
    pub fn minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    pub slots: Vec<AllocatedSlot>,
    /// Set when the horizon ran out before every hour was placed.
    pub truncated: bool,
}

impl Allocation {
    pub fn allocated_minutes(&self) -> u32 {
        self.slots.iter().map(|slot| u32::from(slot.minutes())).sum()
    }

    pub fn allocated_hours(&self) -> f64 {
        f64::from(self.allocated_minutes()) / 60.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskAllocation {
    pub task_title: String,
    pub blocks: Vec<AllocatedBlock>,
    pub study_blocks: Vec<StudyBlock>,
    pub truncated: bool,
    pub unallocated_hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    /// One outcome per input task, in input order.
    pub outcomes: Vec<Result<TaskAllocation, DomainError>>,
}

impl AllocationPlan {
    pub fn is_truncated(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.as_ref().is_ok_and(|allocation| allocation.truncated))
    }

    /// Folds every allocated block into a calendar: one day per date, entries by
    /// start time, priorities numbered in that order.
    pub fn into_calendar(self) -> Calendar {
        let task_count = self.outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let mut by_date: BTreeMap<NaiveDate, Vec<StudyBlock>> = BTreeMap::new();
        for allocation in self.outcomes.into_iter().flatten() {
            for block in allocation.study_blocks {
                by_date.entry(block.date).or_default().push(block);
            }
        }

        let days = by_date
            .into_iter()
            .map(|(date, mut entries)| {
                entries.sort_by_key(|entry| entry.start_minute);
                for (index, entry) in entries.iter_mut().enumerate() {
                    entry.priority = index as u32 + 1;
                }
                DayPlan {
                    date,
                    entries,
                    notes: None,
                }
            })
            .collect();

        Calendar {
            summary: format!("Fallback allocation for {task_count} task(s)"),
            days,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Allocator {
    settings: AllocationSettings,
}

impl Allocator {
    pub fn new(settings: AllocationSettings) -> Self {
        Self { settings }
    }

    pub fn allocate(
        &self,
        estimated_hours: f64,
        deadline: NaiveDate,
        today: NaiveDate,
    ) -> Result<Allocation, DomainError> {
        allocate(
            estimated_hours,
            self.settings.max_hours_per_day,
            self.settings.day_start_hour,
            deadline,
            today,
            self.settings.horizon_cap_days,
        )
    }

    pub fn allocate_task(&self, task: &Task, now: NaiveDateTime) -> Result<TaskAllocation, DomainError> {
        let mut usage = BTreeMap::new();
        self.allocate_task_with_usage(task, now, &mut usage)
    }

    /// Allocates a whole task list against one shared daily budget. Tasks with
    /// closer deadlines claim capacity first; outcomes keep input order and an
    /// invalid task only fails its own slot.
    pub fn allocate_all(&self, tasks: &[Task], now: NaiveDateTime) -> AllocationPlan {
        let mut order = (0..tasks.len()).collect::<Vec<_>>();
        order.sort_by(|left, right| compare_deadlines(&tasks[*left], &tasks[*right]));

        let mut usage = BTreeMap::new();
        let mut outcomes = vec![None; tasks.len()];
        for index in order {
            let outcome = self.allocate_task_with_usage(&tasks[index], now, &mut usage);
            if let Err(error) = &outcome {
                tracing::warn!(task = %tasks[index].title, %error, "task rejected by allocator");
            }
            outcomes[index] = Some(outcome);
        }

        AllocationPlan {
            outcomes: outcomes.into_iter().flatten().collect(),
        }
    }

    fn allocate_task_with_usage(
        &self,
        task: &Task,
        now: NaiveDateTime,
        usage: &mut BTreeMap<NaiveDate, u16>,
    ) -> Result<TaskAllocation, DomainError> {
        task.validate().map_err(DomainError::InvalidAllocationInput)?;
        let today = now.date();
        let (deadline, last_day_end) = self.effective_deadline(task, today)?;
        let mut limits = Limits::new(
            task.estimated_hours,
            self.settings.max_hours_per_day,
            self.settings.day_start_hour,
            deadline,
            today,
            self.settings.horizon_cap_days,
        )?;
        if limits.latest_day == deadline {
            limits.last_day_end = last_day_end;
        }
        let allocation = limits.walk(today, usage);
        if allocation.truncated {
            tracing::warn!(
                task = %task.title,
                requested_hours = task.estimated_hours,
                allocated_hours = allocation.allocated_hours(),
                "allocation truncated before deadline"
            );
        }

        let part_count = allocation.slots.len();
        let mut blocks = Vec::with_capacity(part_count);
        let mut study_blocks = Vec::with_capacity(part_count);
        for (index, slot) in allocation.slots.iter().enumerate() {
            let subtask_name = if part_count == 1 {
                task.title.clone()
            } else {
                format!("{} (part {}/{})", task.title, index + 1, part_count)
            };
            blocks.push(AllocatedBlock {
                date: slot.date,
                start_datetime: at_minute(slot.date, slot.start_minute),
                end_datetime: at_minute(slot.date, slot.end_minute),
                subject_title: task.title.clone(),
                subject_name: task.subject_name.clone(),
                exam_type: task.exam_type,
                subtask_name: subtask_name.clone(),
                estimated_hours: f64::from(slot.minutes()) / 60.0,
            });
            study_blocks.push(StudyBlock {
                date: slot.date,
                start_minute: slot.start_minute,
                end_minute: slot.end_minute,
                task_name: subtask_name,
                subject_name: task.subject_name.clone(),
                difficulty: task.difficulty,
                priority: 1,
            });
        }

        let unallocated_hours = (task.estimated_hours - allocation.allocated_hours()).max(0.0);
        Ok(TaskAllocation {
            task_title: task.title.clone(),
            blocks,
            study_blocks,
            truncated: allocation.truncated,
            unallocated_hours: if allocation.truncated { unallocated_hours } else { 0.0 },
        })
    }

    /// Last usable date and, when work must stop early that day, the minute
    /// by which it has to end. Work finishes `safety_margin_hours` before the
    /// deadline instant; a cut-off at or before the day start moves the last
    /// usable day back by one.
    fn effective_deadline(
        &self,
        task: &Task,
        today: NaiveDate,
    ) -> Result<(NaiveDate, Option<u16>), DomainError> {
        let Some(deadline) = task.deadline else {
            return Ok((add_days(today, self.settings.horizon_cap_days), None));
        };

        let margin_hours = self.settings.safety_margin_hours.clamp(0.0, MAX_SAFETY_MARGIN_HOURS);
        let margin = Duration::minutes(hours_to_minutes(margin_hours));
        let cutoff = deadline.checked_sub_signed(margin).unwrap_or(deadline);
        let cutoff_minute = minutes_of(cutoff.time());
        let day_start_minute = (self.settings.day_start_hour.min(23) * 60) as u16;

        let effective = if cutoff_minute <= day_start_minute {
            cutoff.date().pred_opt().map(|date| (date, None))
        } else {
            Some((cutoff.date(), Some(cutoff_minute)))
        };
        match effective {
            Some((date, last_day_end)) if date >= today => Ok((date, last_day_end)),
            _ => Err(DomainError::InvalidAllocationInput(format!(
                "deadline {deadline} for '{}' leaves no time before {today}",
                task.title
            ))),
        }
    }
}

/// Greedily spreads `estimated_hours` over consecutive days starting at `today`,
/// at most `max_hours_per_day` per day, each block starting at
/// `day_start_hour` plus the hours already used that day. Stops at the earlier
/// of `deadline` and `today + horizon_cap_days`; hours that do not fit are
/// reported through `Allocation::truncated`.
///
/// Work is placed in whole minutes: `estimated_hours` and `max_hours_per_day`
/// are rounded to the nearest minute, so a positive cap below 30 seconds
/// leaves no daily capacity and is rejected like a non-positive one.
pub fn allocate(
    estimated_hours: f64,
    max_hours_per_day: f64,
    day_start_hour: u32,
    deadline: NaiveDate,
    today: NaiveDate,
    horizon_cap_days: u32,
) -> Result<Allocation, DomainError> {
    let limits = Limits::new(
        estimated_hours,
        max_hours_per_day,
        day_start_hour,
        deadline,
        today,
        horizon_cap_days,
    )?;
    Ok(limits.walk(today, &mut BTreeMap::new()))
}

struct Limits {
    total_minutes: u32,
    day_capacity: u16,
    day_start_minute: u16,
    latest_day: NaiveDate,
    /// Minute by which work on `latest_day` must end, if earlier than usual.
    last_day_end: Option<u16>,
}

impl Limits {
    fn new(
        estimated_hours: f64,
        max_hours_per_day: f64,
        day_start_hour: u32,
        deadline: NaiveDate,
        today: NaiveDate,
        horizon_cap_days: u32,
    ) -> Result<Self, DomainError> {
        if !estimated_hours.is_finite() || estimated_hours < 0.0 {
            return Err(DomainError::InvalidAllocationInput(format!(
                "estimated_hours must be a non-negative number, got {estimated_hours}"
            )));
        }
        if !max_hours_per_day.is_finite() || max_hours_per_day <= 0.0 {
            return Err(DomainError::InvalidAllocationInput(format!(
                "max_hours_per_day must be positive, got {max_hours_per_day}"
            )));
        }
        if day_start_hour > 23 {
            return Err(DomainError::InvalidAllocationInput(format!(
                "day_start_hour must be within 0..=23, got {day_start_hour}"
            )));
        }
        if deadline < today {
            return Err(DomainError::InvalidAllocationInput(format!(
                "deadline {deadline} is before today {today}"
            )));
        }

        let day_start_minute = (day_start_hour * 60) as u16;
        let cap_minutes = hours_to_minutes(max_hours_per_day.min(24.0));
        let day_capacity = (cap_minutes as u16).min(MINUTES_PER_DAY - day_start_minute);
        if day_capacity == 0 {
            return Err(DomainError::InvalidAllocationInput(format!(
                "max_hours_per_day {max_hours_per_day} is below one minute"
            )));
        }

        let horizon_end = add_days(today, horizon_cap_days);
        Ok(Self {
            total_minutes: hours_to_minutes(estimated_hours).clamp(0, i64::from(u32::MAX)) as u32,
            day_capacity,
            day_start_minute,
            latest_day: deadline.min(horizon_end),
            last_day_end: None,
        })
    }

    fn walk(&self, today: NaiveDate, usage: &mut BTreeMap<NaiveDate, u16>) -> Allocation {
        let mut slots = Vec::new();
        let mut minutes_left = self.total_minutes;
        let mut cursor = today;
        let mut used_today = usage.get(&cursor).copied().unwrap_or(0);

        while minutes_left > 0 && cursor <= self.latest_day {
            if used_today >= self.capacity_on(cursor) {
                let Some(next) = cursor.succ_opt() else {
                    break;
                };
                cursor = next;
                used_today = usage.get(&cursor).copied().unwrap_or(0);
                continue;
            }

            let chunk = minutes_left.min(u32::from(self.capacity_on(cursor) - used_today)) as u16;
            let start_minute = self.day_start_minute + used_today;
            slots.push(AllocatedSlot {
                date: cursor,
                start_minute,
                end_minute: start_minute + chunk,
            });
            minutes_left -= u32::from(chunk);
            used_today += chunk;
            usage.insert(cursor, used_today);
        }

        Allocation {
            slots,
            truncated: minutes_left > 0,
        }
    }
}

impl Limits {
    fn capacity_on(&self, date: NaiveDate) -> u16 {
        match self.last_day_end {
            Some(end) if date == self.latest_day => self
                .day_capacity
                .min(end.saturating_sub(self.day_start_minute)),
            _ => self.day_capacity,
        }
    }
}

fn hours_to_minutes(hours: f64) -> i64 {
    (hours * 60.0).round() as i64
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

fn at_minute(date: NaiveDate, minute: u16) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minute))
}

fn compare_deadlines(left: &Task, right: &Task) -> Ordering {
    match (left.deadline, right.deadline) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ExamType;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
    }

    fn now() -> NaiveDateTime {
        today().and_hms_opt(8, 0, 0).expect("valid time")
    }

    fn days_after(days: u64) -> NaiveDate {
        today().checked_add_days(Days::new(days)).expect("valid date")
    }

    fn sample_task(title: &str, hours: f64, deadline: Option<NaiveDateTime>) -> Task {
        Task {
            title: title.to_string(),
            subject_name: "Databases".to_string(),
            exam_type: ExamType::Written,
            difficulty: 3,
            estimated_hours: hours,
            deadline,
        }
    }

    #[test]
    fn allocation_fits_before_deadline() {
        let allocation = allocate(5.0, 2.0, 18, days_after(3), today(), 30).expect("allocate");

        assert!(!allocation.truncated);
        assert_eq!(allocation.allocated_hours(), 5.0);
        assert_eq!(allocation.slots.len(), 3);
        assert_eq!(allocation.slots[0].date, today());
        assert_eq!(allocation.slots[0].start_minute, 18 * 60);
        assert_eq!(allocation.slots[0].end_minute, 20 * 60);
        assert_eq!(allocation.slots[2].date, days_after(2));
        assert_eq!(allocation.slots[2].minutes(), 60);
        assert!(allocation.slots.iter().all(|slot| slot.minutes() <= 120));
    }

    #[test]
    fn allocation_reports_truncation_when_capacity_is_short() {
        let allocation = allocate(10.0, 2.0, 18, days_after(1), today(), 30).expect("allocate");

        assert!(allocation.truncated);
        assert_eq!(allocation.allocated_hours(), 4.0);
        assert!(allocation.allocated_hours() < 10.0);
    }

    #[test]
    fn horizon_cap_limits_the_walk() {
        let allocation = allocate(10.0, 1.0, 9, days_after(60), today(), 2).expect("allocate");

        assert!(allocation.truncated);
        assert_eq!(allocation.slots.len(), 3);
        assert_eq!(allocation.slots.last().map(|slot| slot.date), Some(days_after(2)));
    }

    #[test]
    fn blocks_never_cross_midnight() {
        let allocation = allocate(3.0, 2.0, 23, days_after(5), today(), 30).expect("allocate");

        assert!(!allocation.truncated);
        assert_eq!(allocation.slots.len(), 3);
        assert!(allocation
            .slots
            .iter()
            .all(|slot| slot.start_minute == 23 * 60 && slot.end_minute == MINUTES_PER_DAY));
    }

    #[test]
    fn fractional_hours_are_rounded_to_minutes() {
        let allocation = allocate(1.0 / 3.0, 2.0, 18, today(), today(), 30).expect("allocate");
        assert_eq!(allocation.allocated_minutes(), 20);
    }

    #[test]
    fn zero_hours_yield_no_blocks() {
        let allocation = allocate(0.0, 2.0, 18, today(), today(), 30).expect("allocate");
        assert!(allocation.slots.is_empty());
        assert!(!allocation.truncated);
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        let invalid = [
            allocate(-1.0, 2.0, 18, days_after(1), today(), 30),
            allocate(1.0, 0.0, 18, days_after(1), today(), 30),
            allocate(1.0, -2.0, 18, days_after(1), today(), 30),
            allocate(1.0, 2.0, 24, days_after(1), today(), 30),
            allocate(f64::NAN, 2.0, 18, days_after(1), today(), 30),
            allocate(1.0, 2.0, 18, today().pred_opt().expect("valid date"), today(), 30),
        ];
        for result in invalid {
            assert!(matches!(result, Err(DomainError::InvalidAllocationInput(_))));
        }
    }

    #[test]
    fn allocate_task_applies_safety_margin() {
        let allocator = Allocator::default();
        let deadline = days_after(2).and_hms_opt(1, 0, 0).expect("valid time");
        let allocation = allocator
            .allocate_task(&sample_task("Exam prep", 8.0, Some(deadline)), now())
            .expect("allocate task");

        // 01:00 minus two hours falls on the previous day.
        assert_eq!(allocation.blocks.last().map(|block| block.date), Some(days_after(1)));
        assert!(allocation.truncated);
        assert_eq!(allocation.unallocated_hours, 4.0);
        assert_eq!(allocation.blocks[0].subtask_name, "Exam prep (part 1/2)");
        assert_eq!(
            allocation.blocks[0].start_datetime,
            today().and_hms_opt(18, 0, 0).expect("valid time")
        );
    }

    #[test]
    fn morning_deadline_moves_work_to_the_previous_evening() {
        let allocator = Allocator::default();
        let deadline = days_after(2).and_hms_opt(12, 0, 0).expect("valid time");
        let allocation = allocator
            .allocate_task(&sample_task("Exam prep", 6.0, Some(deadline)), now())
            .expect("allocate task");

        let cutoff = days_after(2).and_hms_opt(10, 0, 0).expect("valid time");
        assert!(allocation.blocks.iter().all(|block| block.end_datetime <= cutoff));
        assert_eq!(allocation.blocks.last().map(|block| block.date), Some(days_after(1)));
        assert!(allocation.truncated);
        assert_eq!(allocation.unallocated_hours, 2.0);
    }

    #[test]
    fn evening_deadline_shortens_the_last_day() {
        let allocator = Allocator::default();
        let deadline = days_after(1).and_hms_opt(21, 0, 0).expect("valid time");
        let allocation = allocator
            .allocate_task(&sample_task("Lab report", 6.0, Some(deadline)), now())
            .expect("allocate task");

        let last = allocation.blocks.last().expect("last block");
        assert_eq!(last.date, days_after(1));
        assert_eq!(last.start_datetime, days_after(1).and_hms_opt(18, 0, 0).expect("valid time"));
        assert_eq!(last.end_datetime, days_after(1).and_hms_opt(19, 0, 0).expect("valid time"));
        assert_eq!(allocation.unallocated_hours, 3.0);
    }

    #[test]
    fn deadline_earlier_today_than_day_start_is_rejected() {
        let allocator = Allocator::default();
        let deadline = today().and_hms_opt(15, 0, 0).expect("valid time");
        let result = allocator.allocate_task(&sample_task("Quiz", 1.0, Some(deadline)), now());
        assert!(matches!(result, Err(DomainError::InvalidAllocationInput(_))));
    }

    #[test]
    fn allocator_uses_configured_settings() {
        let allocator = Allocator::new(AllocationSettings {
            max_hours_per_day: 1.5,
            day_start_hour: 9,
            ..AllocationSettings::default()
        });
        let allocation = allocator.allocate(3.0, days_after(4), today()).expect("allocate");

        assert_eq!(allocation.slots.len(), 2);
        assert_eq!(allocation.slots[0].start_minute, 9 * 60);
        assert_eq!(allocation.slots[0].end_minute, 10 * 60 + 30);
    }

    #[test]
    fn sub_minute_daily_cap_is_rejected() {
        let result = allocate(1.0, 0.005, 18, days_after(1), today(), 30);
        assert!(matches!(result, Err(DomainError::InvalidAllocationInput(_))));
    }

    #[test]
    fn allocate_task_rejects_passed_deadline() {
        let allocator = Allocator::default();
        let deadline = today().and_hms_opt(1, 0, 0).expect("valid time");
        let result = allocator.allocate_task(&sample_task("Late", 2.0, Some(deadline)), now());
        assert!(matches!(result, Err(DomainError::InvalidAllocationInput(_))));
    }

    #[test]
    fn allocate_all_shares_daily_budget_and_keeps_input_order() {
        let allocator = Allocator::new(AllocationSettings {
            max_hours_per_day: 3.0,
            ..AllocationSettings::default()
        });
        let tasks = vec![
            sample_task("Later", 2.0, Some(days_after(10).and_hms_opt(12, 0, 0).expect("time"))),
            sample_task("Sooner", 2.0, Some(days_after(1).and_hms_opt(12, 0, 0).expect("time"))),
            sample_task("", 1.0, None),
        ];

        let plan = allocator.allocate_all(&tasks, now());
        assert_eq!(plan.outcomes.len(), 3);
        assert!(plan.outcomes[2].is_err());

        let sooner = plan.outcomes[1].as_ref().expect("sooner allocated");
        assert_eq!(sooner.blocks[0].start_datetime, today().and_hms_opt(18, 0, 0).expect("time"));

        let later = plan.outcomes[0].as_ref().expect("later allocated");
        assert_eq!(later.blocks[0].start_datetime, today().and_hms_opt(20, 0, 0).expect("time"));
        assert_eq!(later.blocks[0].estimated_hours, 1.0);

        let calendar = plan.into_calendar();
        let first_day = calendar.day(today()).expect("first day");
        assert_eq!(first_day.entries.len(), 2);
        assert_eq!(first_day.entries[0].priority, 1);
        assert_eq!(first_day.entries[1].priority, 2);
        assert!(!first_day.entries[0].overlaps(&first_day.entries[1]));
    }

    proptest! {
        #[test]
        fn allocation_never_exceeds_daily_cap_or_request(
            hours in 0.0f64..40.0,
            cap in 0.5f64..6.0,
            start_hour in 0u32..24,
            deadline_offset in 0u64..20,
            horizon in 0u32..20
        ) {
            let allocation = allocate(hours, cap, start_hour, days_after(deadline_offset), today(), horizon)
                .expect("valid input");
            let requested = (hours * 60.0).round() as u32;
            let cap_minutes = ((cap * 60.0).round() as u16).min(MINUTES_PER_DAY - (start_hour * 60) as u16);

            let mut per_day: BTreeMap<NaiveDate, u16> = BTreeMap::new();
            for slot in &allocation.slots {
                prop_assert!(slot.start_minute < slot.end_minute);
                prop_assert!(slot.end_minute <= MINUTES_PER_DAY);
                *per_day.entry(slot.date).or_default() += slot.minutes();
            }
            prop_assert!(per_day.values().all(|minutes| *minutes <= cap_minutes));
            prop_assert!(allocation.allocated_minutes() <= requested);
            prop_assert_eq!(allocation.truncated, allocation.allocated_minutes() < requested);
        }
    }
}
