use crate::domain::models::CandidateCalendar;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;

/// Opaque text-generation collaborator: a prompt goes in, free text comes out.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InfraError>;
}

/// Generator output after the JSON boundary. Callers must handle both arms;
/// only `Parsed` may be handed to the legalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedPlan {
    Parsed(CandidateCalendar),
    Raw(String),
}

impl GeneratedPlan {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

pub fn parse_generated_plan(text: &str) -> GeneratedPlan {
    let cleaned = strip_code_fences(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) else {
        return GeneratedPlan::Raw(text.to_string());
    };
    match CandidateCalendar::from_json(&value) {
        Some(candidate) => GeneratedPlan::Parsed(candidate),
        None => GeneratedPlan::Raw(text.to_string()),
    }
}

/// Removes a surrounding Markdown code fence (```json ... ``` or ``` ... ```).
fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = cleaned.trim_end().strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}
