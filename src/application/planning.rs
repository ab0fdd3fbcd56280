use crate::domain::legalizer::LegalizationReport;
use crate::domain::models::{Calendar, CandidateCalendar, DayPlan, Task, TimeWindow};
use crate::domain::time_windows::extract_time_windows;
use crate::infrastructure::config::PlannerConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::plan_generator::{GeneratedPlan, PlanGenerator, parse_generated_plan};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;

const MAX_GENERATION_CONCURRENCY: usize = 8;
pub const TASK_PROMPT_HEADER: &str = "Plan study sessions for one task.";
pub const CALENDAR_PROMPT_HEADER: &str = "Combine the task plans into one JSON calendar.";
pub const RESCHEDULE_PROMPT_HEADER: &str = "Revise the previous JSON calendar using the feedback.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPlanOutcome {
    Planned(String),
    Failed(String),
}

impl TaskPlanOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanResult {
    Legalized {
        calendar: Calendar,
        report: LegalizationReport,
    },
    /// The generator did not produce a calendar. `raw` is its text (empty when
    /// the call itself failed); `fallback` is the legalized allocator plan, or
    /// the legalized previous calendar when rescheduling. `truncated` is set
    /// whenever requested hours are missing from `fallback`.
    Unparsed {
        raw: String,
        fallback: Calendar,
        report: LegalizationReport,
        unplaced_hours: f64,
        truncated: bool,
    },
}

impl PlanResult {
    pub fn calendar(&self) -> &Calendar {
        match self {
            Self::Legalized { calendar, .. } => calendar,
            Self::Unparsed { fallback, .. } => fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanProposal {
    pub forbidden_windows: Vec<TimeWindow>,
    pub task_plans: Vec<TaskPlanOutcome>,
    pub result: PlanResult,
}

pub struct PlanningService<G>
where
    G: PlanGenerator + 'static,
{
    generator: Arc<G>,
    config: PlannerConfig,
}

impl<G> PlanningService<G>
where
    G: PlanGenerator + 'static,
{
    pub fn new(generator: Arc<G>, config: PlannerConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// One generator call per task, at most `min(max_concurrency, 8)` in
    /// flight. Outcomes come back in input order; a failed call only marks its
    /// own task.
    pub async fn plan_tasks(
        &self,
        tasks: &[Task],
        forbidden: &[TimeWindow],
    ) -> Vec<TaskPlanOutcome> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let limit = self
            .config
            .max_concurrency
            .min(MAX_GENERATION_CONCURRENCY)
            .min(tasks.len())
            .max(1);
        let mut running: JoinSet<(usize, Result<String, InfraError>)> = JoinSet::new();
        let mut outcomes: Vec<Option<TaskPlanOutcome>> = vec![None; tasks.len()];

        for (index, task) in tasks.iter().enumerate() {
            let generator = Arc::clone(&self.generator);
            let prompt = task_prompt(task, forbidden);
            running.spawn(async move { (index, generator.generate(&prompt).await) });

            if running.len() >= limit {
                collect_task_plan(&mut running, &mut outcomes).await;
            }
        }

        while !running.is_empty() {
            collect_task_plan(&mut running, &mut outcomes).await;
        }

        outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    TaskPlanOutcome::Failed("generation task did not complete".to_string())
                })
            })
            .collect()
    }

    pub async fn propose_calendar(
        &self,
        tasks: &[Task],
        feedback: &str,
        now: DateTime<Utc>,
    ) -> PlanProposal {
        let forbidden_windows = extract_time_windows(feedback);
        let task_plans = self.plan_tasks(tasks, &forbidden_windows).await;

        let prompt = calendar_prompt(tasks, &task_plans, &forbidden_windows);
        let raw = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "calendar generation failed; using allocator fallback");
                String::new()
            }
        };

        let result = self.legalize_or_fallback(&raw, &forbidden_windows, now, || {
            let plan = self
                .config
                .allocator()
                .allocate_all(tasks, self.config.local_now(now));
            let requested_minutes = tasks
                .iter()
                .map(|task| task.estimated_hours)
                .filter(|hours| hours.is_finite() && *hours > 0.0)
                .map(|hours| (hours * 60.0).round() as u32)
                .sum::<u32>();
            let truncated = plan.is_truncated();
            (plan.into_calendar(), requested_minutes, truncated)
        });

        PlanProposal {
            forbidden_windows,
            task_plans,
            result,
        }
    }

    /// Regenerates `previous` under new feedback. Without a usable answer the
    /// previous calendar itself is legalized against the new forbidden windows.
    pub async fn reschedule_calendar(
        &self,
        previous: &Calendar,
        feedback: &str,
        now: DateTime<Utc>,
    ) -> PlanProposal {
        let forbidden_windows = extract_time_windows(feedback);
        let prompt = reschedule_prompt(previous, feedback, &forbidden_windows);
        let raw = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "reschedule generation failed; keeping previous calendar");
                String::new()
            }
        };

        let result = self.legalize_or_fallback(&raw, &forbidden_windows, now, || {
            (previous.clone(), calendar_minutes(previous), false)
        });

        PlanProposal {
            forbidden_windows,
            task_plans: Vec::new(),
            result,
        }
    }

    /// `fallback` yields the substitute calendar, the minutes it was meant to
    /// hold, and whether it is already known to be short.
    fn legalize_or_fallback<F>(
        &self,
        raw: &str,
        forbidden: &[TimeWindow],
        now: DateTime<Utc>,
        fallback: F,
    ) -> PlanResult
    where
        F: FnOnce() -> (Calendar, u32, bool),
    {
        let legalizer = self.config.legalizer(now);
        match parse_generated_plan(raw) {
            GeneratedPlan::Parsed(candidate) => {
                let (calendar, report) = legalizer.legalize_with_report(&candidate, forbidden);
                PlanResult::Legalized { calendar, report }
            }
            GeneratedPlan::Raw(raw) => {
                let (substitute, requested_minutes, already_short) = fallback();
                let candidate = CandidateCalendar::from(substitute);
                let (fallback, report) = legalizer.legalize_with_report(&candidate, forbidden);
                let unplaced_minutes = requested_minutes.saturating_sub(calendar_minutes(&fallback));
                if unplaced_minutes > 0 {
                    tracing::warn!(
                        unplaced_minutes,
                        dropped_entries = report.total_dropped_entries(),
                        "fallback calendar is missing requested hours"
                    );
                }
                PlanResult::Unparsed {
                    raw,
                    fallback,
                    report,
                    unplaced_hours: f64::from(unplaced_minutes) / 60.0,
                    truncated: already_short || unplaced_minutes > 0,
                }
            }
        }
    }
}

fn calendar_minutes(calendar: &Calendar) -> u32 {
    calendar.days.iter().map(DayPlan::total_minutes).sum()
}

async fn collect_task_plan(
    running: &mut JoinSet<(usize, Result<String, InfraError>)>,
    outcomes: &mut [Option<TaskPlanOutcome>],
) {
    let Some(join_result) = running.join_next().await else {
        return;
    };
    match join_result {
        Ok((index, result)) => {
            let outcome = match result {
                Ok(text) => TaskPlanOutcome::Planned(text),
                Err(error) => {
                    tracing::warn!(task_index = index, %error, "task plan generation failed");
                    TaskPlanOutcome::Failed(error.to_string())
                }
            };
            if let Some(slot) = outcomes.get_mut(index) {
                *slot = Some(outcome);
            }
        }
        // The index is lost with the task; its slot is reported as failed later.
        Err(error) => tracing::error!(%error, "failed to join task plan generation"),
    }
}

fn forbidden_line(forbidden: &[TimeWindow]) -> String {
    if forbidden.is_empty() {
        return "Forbidden times: none".to_string();
    }
    let windows = forbidden
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Forbidden times: {windows}")
}

fn task_prompt(task: &Task, forbidden: &[TimeWindow]) -> String {
    let deadline = task
        .deadline
        .map(|deadline| deadline.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "{TASK_PROMPT_HEADER}\nTask: {}\nSubject: {}\nType: {}\nDifficulty: {}/5\nEstimated hours: {}\nDeadline: {deadline}\n{}",
        task.title,
        task.subject_name,
        task.exam_type.as_str(),
        task.difficulty,
        task.estimated_hours,
        forbidden_line(forbidden),
    )
}

fn calendar_prompt(tasks: &[Task], plans: &[TaskPlanOutcome], forbidden: &[TimeWindow]) -> String {
    let mut prompt = format!("{CALENDAR_PROMPT_HEADER}\n{}\n", forbidden_line(forbidden));
    for (task, plan) in tasks.iter().zip(plans) {
        match plan {
            TaskPlanOutcome::Planned(text) => {
                prompt.push_str(&format!("\n## {} ({})\n{text}\n", task.title, task.subject_name));
            }
            TaskPlanOutcome::Failed(_) => {
                prompt.push_str(&format!("\n## {} ({})\nNo plan available.\n", task.title, task.subject_name));
            }
        }
    }
    prompt
}

fn reschedule_prompt(previous: &Calendar, feedback: &str, forbidden: &[TimeWindow]) -> String {
    let previous = serde_json::to_string_pretty(previous).unwrap_or_default();
    format!(
        "{RESCHEDULE_PROMPT_HEADER}\n{}\nFeedback: {}\nPrevious calendar:\n{previous}\n",
        forbidden_line(forbidden),
        feedback.trim(),
    )
}
