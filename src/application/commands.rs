use crate::application::bootstrap::bootstrap_workspace;
use crate::application::planning::{PlanProposal, PlanResult, PlanningService, TaskPlanOutcome};
use crate::domain::legalizer::{DropReason, LegalizationReport};
use crate::domain::models::{AllocatedBlock, Calendar, DayPlan, Task, TimeWindow, parse_date};
use crate::domain::time_windows::extract_time_windows;
use crate::infrastructure::calendar_store::{CalendarStore, SqliteCalendarStore};
use crate::infrastructure::config::{PlannerConfig, load_planner_config, save_planner_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::plan_generator::{GeneratedPlan, PlanGenerator, parse_generated_plan};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: Mutex<PlannerConfig>,
    store: Arc<dyn CalendarStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteCalendarStore::new(&bootstrap.database_path));

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            config: Mutex::new(bootstrap.config),
            store,
            log_guard: Mutex::new(()),
        })
    }

    /// Same workspace layout, with calendars kept in `store` instead of SQLite.
    pub fn with_store(workspace_root: PathBuf, store: Arc<dyn CalendarStore>) -> Result<Self, InfraError> {
        let mut state = Self::new(workspace_root)?;
        state.store = store;
        Ok(state)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> Result<PlannerConfig, InfraError> {
        self.config
            .lock()
            .map(|config| config.clone())
            .map_err(|error| InfraError::InvalidConfig(format!("config lock poisoned: {error}")))
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn replace_config(&self, config: PlannerConfig) -> Result<(), InfraError> {
        let mut current = self
            .config
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("config lock poisoned: {error}")))?;
        *current = config;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimeWindowResponse {
    pub start: String,
    pub end: String,
}

impl From<TimeWindow> for TimeWindowResponse {
    fn from(window: TimeWindow) -> Self {
        let (start, end) = window.as_hhmm_pair();
        Self { start, end }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskAllocationResponse {
    pub task_title: String,
    pub blocks: Vec<AllocatedBlock>,
    pub truncated: bool,
    pub unallocated_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocateTasksResponse {
    pub tasks: Vec<TaskAllocationResponse>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LegalizationSummary {
    pub kept_entries: usize,
    pub dropped_days: BTreeMap<String, usize>,
    pub dropped_entries: BTreeMap<String, usize>,
}

impl From<&LegalizationReport> for LegalizationSummary {
    fn from(report: &LegalizationReport) -> Self {
        Self {
            kept_entries: report.kept_entries,
            dropped_days: counts_by_name(&report.dropped_days),
            dropped_entries: counts_by_name(&report.dropped_entries),
        }
    }
}

fn counts_by_name(counts: &BTreeMap<DropReason, usize>) -> BTreeMap<String, usize> {
    counts
        .iter()
        .map(|(reason, count)| (reason.as_str().to_string(), *count))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct LegalizeCalendarResponse {
    pub calendar: Calendar,
    pub report: LegalizationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposeCalendarResponse {
    pub calendar: Calendar,
    /// `false` when the generator output was unusable and `calendar` is the
    /// allocator fallback.
    pub legalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub report: LegalizationSummary,
    /// Requested hours missing from a fallback `calendar`.
    pub unplaced_hours: f64,
    pub truncated: bool,
    pub forbidden_windows: Vec<TimeWindowResponse>,
    pub failed_tasks: Vec<String>,
}

pub fn extract_time_windows_impl(state: &AppState, feedback: String) -> Vec<TimeWindowResponse> {
    let windows = extract_time_windows(&feedback);
    state.log_info(
        "extract_time_windows",
        &format!("extracted windows={}", windows.len()),
    );
    windows.into_iter().map(TimeWindowResponse::from).collect()
}

pub fn allocate_tasks_impl(
    state: &AppState,
    tasks: Vec<Task>,
    now: DateTime<Utc>,
) -> Result<AllocateTasksResponse, InfraError> {
    let config = state.config()?;
    let plan = config.allocator().allocate_all(&tasks, config.local_now(now));
    let truncated = plan.is_truncated();

    let responses = tasks
        .iter()
        .zip(plan.outcomes)
        .map(|(task, outcome)| match outcome {
            Ok(allocation) => TaskAllocationResponse {
                task_title: allocation.task_title,
                blocks: allocation.blocks,
                truncated: allocation.truncated,
                unallocated_hours: allocation.unallocated_hours,
                error: None,
            },
            Err(error) => TaskAllocationResponse {
                task_title: task.title.clone(),
                blocks: Vec::new(),
                truncated: false,
                unallocated_hours: task.estimated_hours,
                error: Some(error.to_string()),
            },
        })
        .collect::<Vec<_>>();

    state.log_info(
        "allocate_tasks",
        &format!("allocated tasks={} truncated={truncated}", responses.len()),
    );
    Ok(AllocateTasksResponse {
        tasks: responses,
        truncated,
    })
}

/// Legalizes raw generator output against the feedback's forbidden windows and
/// stores the result for `user_id`.
pub fn legalize_calendar_impl(
    state: &AppState,
    user_id: String,
    generated: String,
    feedback: String,
    now: DateTime<Utc>,
) -> Result<LegalizeCalendarResponse, InfraError> {
    let user_id = require_user_id(&user_id)?;
    let GeneratedPlan::Parsed(candidate) = parse_generated_plan(&generated) else {
        return Err(InfraError::Generation(
            "generator output is not a calendar document".to_string(),
        ));
    };

    let forbidden = extract_time_windows(&feedback);
    let (calendar, report) = state
        .config()?
        .legalizer(now)
        .legalize_with_report(&candidate, &forbidden);
    state.store.save(user_id, &calendar)?;

    state.log_info(
        "legalize_calendar",
        &format!(
            "user_id={user_id} kept={} dropped={}",
            report.kept_entries,
            report.total_dropped_entries()
        ),
    );
    Ok(LegalizeCalendarResponse {
        calendar,
        report: LegalizationSummary::from(&report),
    })
}

pub async fn propose_calendar_impl<G>(
    state: &AppState,
    generator: Arc<G>,
    user_id: String,
    tasks: Vec<Task>,
    feedback: String,
    now: DateTime<Utc>,
) -> Result<ProposeCalendarResponse, InfraError>
where
    G: PlanGenerator + 'static,
{
    let user_id = require_user_id(&user_id)?;
    let started = Instant::now();
    let service = PlanningService::new(generator, state.config()?);
    let proposal = service.propose_calendar(&tasks, &feedback, now).await;

    let failed_tasks = tasks
        .iter()
        .zip(&proposal.task_plans)
        .filter(|(_, outcome)| matches!(outcome, TaskPlanOutcome::Failed(_)))
        .map(|(task, _)| task.title.clone())
        .collect::<Vec<_>>();
    let response = proposal_response(proposal, failed_tasks);
    state.store.save(user_id, &response.calendar)?;

    state.log_info(
        "propose_calendar",
        &format!(
            "user_id={user_id} legalized={} entries={} truncated={} failed_tasks={} elapsed_ms={}",
            response.legalized,
            response.calendar.entry_count(),
            response.truncated,
            response.failed_tasks.len(),
            started.elapsed().as_millis()
        ),
    );
    Ok(response)
}

/// Regenerates the user's stored calendar under new feedback and stores the
/// result. An unusable answer keeps the legal part of the stored calendar.
pub async fn reschedule_calendar_impl<G>(
    state: &AppState,
    generator: Arc<G>,
    user_id: String,
    feedback: String,
    now: DateTime<Utc>,
) -> Result<ProposeCalendarResponse, InfraError>
where
    G: PlanGenerator + 'static,
{
    let user_id = require_user_id(&user_id)?;
    let started = Instant::now();
    let previous = state.store.latest(user_id)?;
    let service = PlanningService::new(generator, state.config()?);
    let proposal = service.reschedule_calendar(&previous, &feedback, now).await;

    state.store.save(user_id, proposal.result.calendar())?;
    let response = proposal_response(proposal, Vec::new());

    state.log_info(
        "reschedule_calendar",
        &format!(
            "user_id={user_id} previous_entries={} legalized={} entries={} truncated={} elapsed_ms={}",
            previous.entry_count(),
            response.legalized,
            response.calendar.entry_count(),
            response.truncated,
            started.elapsed().as_millis()
        ),
    );
    Ok(response)
}

fn proposal_response(proposal: PlanProposal, failed_tasks: Vec<String>) -> ProposeCalendarResponse {
    let forbidden_windows = proposal
        .forbidden_windows
        .into_iter()
        .map(TimeWindowResponse::from)
        .collect();

    match proposal.result {
        PlanResult::Legalized { calendar, report } => ProposeCalendarResponse {
            calendar,
            legalized: true,
            raw_response: None,
            report: LegalizationSummary::from(&report),
            unplaced_hours: 0.0,
            truncated: false,
            forbidden_windows,
            failed_tasks,
        },
        PlanResult::Unparsed {
            raw,
            fallback,
            report,
            unplaced_hours,
            truncated,
        } => ProposeCalendarResponse {
            calendar: fallback,
            legalized: false,
            raw_response: Some(raw),
            report: LegalizationSummary::from(&report),
            unplaced_hours,
            truncated,
            forbidden_windows,
            failed_tasks,
        },
    }
}

pub fn latest_calendar_impl(state: &AppState, user_id: String) -> Result<Calendar, InfraError> {
    let user_id = require_user_id(&user_id)?;
    state.store.latest(user_id)
}

pub fn get_day_plan_impl(
    state: &AppState,
    user_id: String,
    date: String,
) -> Result<Option<DayPlan>, InfraError> {
    let user_id = require_user_id(&user_id)?;
    let date = parse_date(&date)
        .ok_or_else(|| InfraError::InvalidConfig(format!("date must be YYYY-MM-DD: {date}")))?;
    state.store.get(user_id, date)
}

pub fn update_planner_config_impl(
    state: &AppState,
    config: PlannerConfig,
) -> Result<PlannerConfig, InfraError> {
    save_planner_config(state.config_dir(), &config)?;
    let reloaded = load_planner_config(state.config_dir())?;
    state.replace_config(reloaded.clone())?;
    state.log_info(
        "update_planner_config",
        &format!("timezone={} dropPastEntries={}", reloaded.timezone, reloaded.drop_past_entries),
    );
    Ok(reloaded)
}

fn require_user_id(user_id: &str) -> Result<&str, InfraError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(InfraError::InvalidConfig("user_id must not be empty".to_string()));
    }
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ExamType;
    use crate::infrastructure::calendar_store::InMemoryCalendarStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "planner-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }

        fn log_lines(&self) -> Vec<serde_json::Value> {
            fs::read_to_string(self.path.join("logs").join("commands.log"))
                .unwrap_or_default()
                .lines()
                .map(|line| serde_json::from_str(line).expect("log line is json"))
                .collect()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    struct FixedGenerator {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        fn new(response: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                response: response.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .expect("prompt log")
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl PlanGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, InfraError> {
            self.prompts.lock().expect("prompt log").push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap()
    }

    fn task(title: &str, hours: f64) -> Task {
        Task {
            title: title.to_string(),
            subject_name: "Operating Systems".to_string(),
            exam_type: ExamType::Practical,
            difficulty: 4,
            estimated_hours: hours,
            deadline: NaiveDate::from_ymd_opt(2026, 2, 18)
                .and_then(|date| date.and_hms_opt(20, 0, 0)),
        }
    }

    const GENERATED: &str = r#"{
        "summary": "Kernel week",
        "calendar": [
            { "date": "2026-02-17", "entries": [
                { "time_allotted": "18:00–19:30", "task_name": "Scheduling",
                  "subject_name/project_name": "Operating Systems", "difficulty": 4, "priority": 3 },
                { "time_allotted": "19:00–20:00", "task_name": "Paging",
                  "subject_name/project_name": "Operating Systems", "difficulty": 4, "priority": 1 } ] },
            { "date": "17/02/2026", "entries": [] }
        ]
    }"#;

    #[test]
    fn bootstrap_creates_workspace_layout() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        assert!(state.config_dir().join("planner.json").exists());
        assert!(state.database_path().exists());
        assert!(workspace.path.join("logs").is_dir());
        assert_eq!(state.config().expect("config"), PlannerConfig::default());
    }

    #[test]
    fn extract_time_windows_formats_hhmm_and_logs() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let windows = extract_time_windows_impl(&state, "Busy 9-11 and 14:30 to 16".to_string());
        assert_eq!(
            windows,
            vec![
                TimeWindowResponse { start: "09:00".to_string(), end: "11:00".to_string() },
                TimeWindowResponse { start: "14:30".to_string(), end: "16:00".to_string() },
            ]
        );

        let logs = workspace.log_lines();
        assert_eq!(logs.last().expect("log line")["command"], "extract_time_windows");
        assert_eq!(logs.last().expect("log line")["level"], "info");
    }

    #[test]
    fn allocate_tasks_reports_truncation_and_rejections() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let mut invalid = task("Broken", 1.0);
        invalid.difficulty = 9;

        let response = allocate_tasks_impl(&state, vec![task("Threads", 10.0), invalid], now())
            .expect("allocate tasks");

        assert!(response.truncated);
        assert_eq!(response.tasks.len(), 2);
        assert!(response.tasks[0].truncated);
        assert!(!response.tasks[0].blocks.is_empty());
        assert!(response.tasks[0].unallocated_hours > 0.0);
        assert!(response.tasks[1].error.is_some());
        assert!(response.tasks[1].blocks.is_empty());
    }

    #[test]
    fn legalize_calendar_stores_the_result() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let response = legalize_calendar_impl(
            &state,
            "student-1".to_string(),
            GENERATED.to_string(),
            String::new(),
            now(),
        )
        .expect("legalize calendar");

        assert_eq!(response.calendar.entry_count(), 1);
        assert_eq!(response.report.dropped_entries.get("intra_day_overlap"), Some(&1));
        assert_eq!(response.report.dropped_days.get("invalid_date"), Some(&1));

        let stored = get_day_plan_impl(&state, "student-1".to_string(), "2026-02-17".to_string())
            .expect("get day plan")
            .expect("stored day");
        assert_eq!(stored.entries[0].task_name, "Scheduling");
        assert_eq!(stored.entries[0].priority, 1);
    }

    #[test]
    fn legalize_calendar_rejects_prose_and_blank_user() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let prose = legalize_calendar_impl(
            &state,
            "student-1".to_string(),
            "no calendar here".to_string(),
            String::new(),
            now(),
        );
        assert!(matches!(prose, Err(InfraError::Generation(_))));

        let blank = latest_calendar_impl(&state, "   ".to_string());
        assert!(matches!(blank, Err(InfraError::InvalidConfig(_))));

        let bad_date = get_day_plan_impl(&state, "student-1".to_string(), "tomorrow".to_string());
        assert!(bad_date.is_err());
    }

    #[tokio::test]
    async fn propose_calendar_legalizes_and_persists() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(InMemoryCalendarStore::default());
        let state = AppState::with_store(workspace.path.clone(), store.clone())
            .expect("initialize app state");
        let generator = FixedGenerator::new(format!("```json\n{GENERATED}\n```"));

        let response = propose_calendar_impl(
            &state,
            generator,
            "student-1".to_string(),
            vec![task("Scheduling", 1.5)],
            "I have labs between 19 and 21".to_string(),
            now(),
        )
        .await
        .expect("propose calendar");

        assert!(response.legalized);
        assert!(response.raw_response.is_none());
        assert!(response.failed_tasks.is_empty());
        assert_eq!(response.forbidden_windows.len(), 1);
        assert_eq!(response.calendar.entry_count(), 0);
        assert_eq!(response.report.dropped_entries.get("forbidden_overlap"), Some(&2));
        assert_eq!(store.latest("student-1").expect("latest").summary, "Kernel week");
    }

    #[tokio::test]
    async fn propose_calendar_falls_back_on_prose() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let generator = FixedGenerator::new("I am unable to help with that.");

        let response = propose_calendar_impl(
            &state,
            generator,
            "student-1".to_string(),
            vec![task("Scheduling", 1.5)],
            String::new(),
            now(),
        )
        .await
        .expect("propose calendar");

        assert!(!response.legalized);
        assert_eq!(response.raw_response.as_deref(), Some("I am unable to help with that."));
        assert_eq!(response.calendar.entry_count(), 1);
        assert_eq!(response.calendar.days[0].entries[0].time_allotted(), "18:00–19:30");
        assert!(!response.truncated);
        assert_eq!(response.unplaced_hours, 0.0);

        let latest = latest_calendar_impl(&state, "student-1".to_string()).expect("latest");
        assert_eq!(latest, response.calendar);
    }

    #[test]
    fn update_planner_config_persists_and_applies() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let mut config = state.config().expect("config");
        config.allocation.day_start_hour = 9;

        let updated = update_planner_config_impl(&state, config).expect("update config");
        assert_eq!(updated.allocation.day_start_hour, 9);

        let response = allocate_tasks_impl(&state, vec![task("Threads", 1.0)], now())
            .expect("allocate tasks");
        assert_eq!(
            response.tasks[0].blocks[0].start_datetime.time(),
            chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
    }

    const RESCHEDULED: &str = r#"{
        "summary": "Rescheduled",
        "calendar": [
            { "date": "2026-02-18", "entries": [
                { "time_allotted": "09:00–10:00", "task_name": "Scheduling review",
                  "subject_name/project_name": "Operating Systems", "difficulty": 4, "priority": 1 },
                { "time_allotted": "13:00–14:00", "task_name": "Paging",
                  "subject_name/project_name": "Operating Systems", "difficulty": 4, "priority": 2 } ] }
        ]
    }"#;

    fn store_generated_calendar(state: &AppState) {
        legalize_calendar_impl(
            state,
            "student-1".to_string(),
            GENERATED.to_string(),
            String::new(),
            now(),
        )
        .expect("legalize calendar");
    }

    #[tokio::test]
    async fn reschedule_calendar_feeds_stored_calendar_to_generator() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        store_generated_calendar(&state);
        let generator = FixedGenerator::new(RESCHEDULED);

        let response = reschedule_calendar_impl(
            &state,
            generator.clone(),
            "student-1".to_string(),
            "busy between 13 and 14".to_string(),
            now(),
        )
        .await
        .expect("reschedule calendar");

        let prompt = generator.last_prompt();
        assert!(prompt.contains("Feedback: busy between 13 and 14"));
        assert!(prompt.contains("\"task_name\": \"Scheduling\""));
        assert!(prompt.contains("18:00–19:30"));

        assert!(response.legalized);
        assert_eq!(response.calendar.entry_count(), 1);
        assert_eq!(response.report.dropped_entries.get("forbidden_overlap"), Some(&1));

        let latest = latest_calendar_impl(&state, "student-1".to_string()).expect("latest");
        assert_eq!(latest.summary, "Rescheduled");
        let rescheduled_day = latest
            .day(NaiveDate::from_ymd_opt(2026, 2, 18).unwrap())
            .expect("rescheduled day");
        assert_eq!(rescheduled_day.entries[0].task_name, "Scheduling review");
    }

    #[tokio::test]
    async fn reschedule_calendar_falls_back_to_legal_part_of_stored_calendar() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        store_generated_calendar(&state);
        let generator = FixedGenerator::new("Could not reschedule.");

        let response = reschedule_calendar_impl(
            &state,
            generator,
            "student-1".to_string(),
            "no study 18-19".to_string(),
            now(),
        )
        .await
        .expect("reschedule calendar");

        assert!(!response.legalized);
        assert_eq!(response.raw_response.as_deref(), Some("Could not reschedule."));
        assert_eq!(response.calendar.summary, "Kernel week");
        assert_eq!(response.calendar.entry_count(), 0);
        assert_eq!(response.report.dropped_entries.get("forbidden_overlap"), Some(&1));
        assert_eq!(response.unplaced_hours, 1.5);
        assert!(response.truncated);
    }

    #[tokio::test]
    async fn reschedule_without_stored_calendar_still_answers() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let generator = FixedGenerator::new("nothing to do");

        let response = reschedule_calendar_impl(
            &state,
            generator.clone(),
            "student-2".to_string(),
            String::new(),
            now(),
        )
        .await
        .expect("reschedule calendar");

        assert!(generator.last_prompt().contains("\"calendar\": []"));
        assert!(!response.legalized);
        assert!(!response.truncated);
        assert_eq!(response.calendar.entry_count(), 0);
    }
}
