use async_trait::async_trait;
use thiserror::Error;

pub mod gemini;
pub mod handlers;

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned no text")]
    EmptyContent,

    #[error("model output is not JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Turns free-form resume text into structured JSON.
#[async_trait]
pub trait ResumeParser: Send + Sync {
    async fn parse(&self, text: &str) -> Result<serde_json::Value, ResumeError>;
}

pub(crate) fn build_prompt(resume_text: &str) -> String {
    format!(
        r#"Extract structured information from the following resume:
Resume: {resume_text}

Return in JSON format:
{{
  "name": "",
  "email": "",
  "phone": "",
  "skills": [],
  "experience": [],
  "education": []
}}"#
    )
}

/// Strips ```json ... ``` or ``` ... ``` fences from model output.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(rest) => rest
            .trim_start()
            .strip_suffix("```")
            .map(str::trim)
            .unwrap_or_else(|| rest.trim()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tagged_fences() {
        assert_eq!(strip_json_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fences() {
        assert_eq!(strip_json_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn leaves_plain_json_alone() {
        assert_eq!(strip_json_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn prompt_embeds_resume_and_schema() {
        let prompt = build_prompt("Jane Doe, Rust engineer");
        assert!(prompt.contains("Jane Doe, Rust engineer"));
        assert!(prompt.contains("\"skills\": []"));
    }
}
