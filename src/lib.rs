pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, bootstrap_workspace};
pub use application::commands::AppState;
pub use application::planning::{PlanProposal, PlanResult, PlanningService, TaskPlanOutcome};
pub use domain::allocator::{Allocation, AllocationPlan, AllocationSettings, Allocator, allocate};
pub use domain::error::DomainError;
pub use domain::legalizer::{DropReason, LegalizationReport, Legalizer, LegalizerPolicy, legalize};
pub use domain::models::{
    AllocatedBlock, Calendar, CandidateCalendar, DayPlan, ExamType, StudyBlock, Task, TimeWindow,
};
pub use domain::time_windows::extract_time_windows;
pub use infrastructure::calendar_store::{CalendarStore, InMemoryCalendarStore, SqliteCalendarStore};
pub use infrastructure::config::PlannerConfig;
pub use infrastructure::error::InfraError;
pub use infrastructure::plan_generator::{GeneratedPlan, PlanGenerator, parse_generated_plan};
