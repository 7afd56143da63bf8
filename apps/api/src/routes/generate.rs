//! Generation endpoints — the prompt producers that drive the invocation
//! layer on behalf of the browser extension.
//!
//! Prompt bodies here are deliberately thin templates; the interesting
//! machinery (retry, rotation, extraction) lives in `crate::llm`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::llm::extract::extract_json;
use crate::state::AppState;

const MAX_INPUT_CHARS: usize = 20_000;

/// Request body for POST /api/v1/generate/answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// The application-form question the extension is filling in.
    pub question: String,
    /// Optional job posting text for grounding.
    pub job_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// POST /api/v1/generate/answer — free-form text generation.
pub async fn handle_generate_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    validate_input("question", &req.question)?;

    let mut prompt = format!(
        "Write a concise, first-person answer to this job application question:\n\n{}",
        req.question
    );
    if let Some(context) = &req.job_context {
        validate_input("job_context", context)?;
        prompt.push_str(&format!("\n\nJob posting for context:\n{context}"));
    }

    let completion = state
        .engine
        .invoke(&prompt, &state.config.service_tag, false)
        .await?;

    Ok(Json(AnswerResponse {
        answer: completion.text,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
    }))
}

/// Request body for POST /api/v1/generate/tailor.
#[derive(Debug, Deserialize)]
pub struct TailorRequest {
    pub resume_text: String,
    pub job_description: String,
}

#[derive(Debug, Serialize)]
pub struct TailorResponse {
    /// Structured tailoring suggestions extracted from the model output.
    pub result: Value,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// POST /api/v1/generate/tailor — structured generation. The model response
/// runs through the extractor; a garbled payload surfaces as a 502 with the
/// strategies that were tried.
pub async fn handle_generate_tailor(
    State(state): State<AppState>,
    Json(req): Json<TailorRequest>,
) -> Result<Json<TailorResponse>, AppError> {
    validate_input("resume_text", &req.resume_text)?;
    validate_input("job_description", &req.job_description)?;

    let prompt = format!(
        "Tailor this resume to the job description. Return a JSON object with \
         keys \"summary\", \"bullets\" (array of strings), and \"keywords\" \
         (array of strings).\n\nResume:\n{}\n\nJob description:\n{}",
        req.resume_text, req.job_description
    );

    let completion = state
        .engine
        .invoke(&prompt, &state.config.service_tag, true)
        .await?;
    let result = extract_json(&completion.text)?;

    Ok(Json(TailorResponse {
        result,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
    }))
}

fn validate_input(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("'{field}' must not be empty")));
    }
    if value.chars().count() > MAX_INPUT_CHARS {
        return Err(AppError::Validation(format!(
            "'{field}' exceeds {MAX_INPUT_CHARS} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(validate_input("question", "   ").is_err());
    }

    #[test]
    fn test_oversized_input_is_rejected() {
        let huge = "a".repeat(MAX_INPUT_CHARS + 1);
        assert!(validate_input("resume_text", &huge).is_err());
    }

    #[test]
    fn test_reasonable_input_passes() {
        assert!(validate_input("question", "Why do you want this role?").is_ok());
    }
}
