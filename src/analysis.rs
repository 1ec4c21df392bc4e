//! AI analysis gateway.
//!
//! Sends a finished daily report to an OpenAI-compatible chat completions
//! endpoint and turns the JSON answer into an [`AiFeedback`] block.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::{status_error, GatewayError};
use crate::report_model::{AiFeedback, DailyReport};
use crate::storage::UserProfile;

const SYSTEM_PROMPT: &str = "You are a wellness coach. You receive one day of a user's health \
log as JSON. Answer with a JSON object with the keys: summary (string), recommendations \
(array of strings), health_score (number from 0 to 100), goals (array of strings), warnings \
(array of strings). Keep every string short.";

/// Produces feedback for a saved report
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze_daily_report(
        &self,
        report: &DailyReport,
        profile: &UserProfile,
    ) -> Result<AiFeedback, GatewayError>;
}

#[derive(Serialize)]
struct AnalysisInput<'a> {
    profile: &'a UserProfile,
    report: &'a DailyReport,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct FeedbackPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default, alias = "healthScore")]
    health_score: Option<f64>,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Client for an OpenAI-compatible chat completions API
#[derive(Clone, Debug)]
pub struct HttpAnalysisGateway {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpAnalysisGateway {
    pub fn new(config: &AnalysisConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

/// Models sometimes wrap JSON in a markdown code fence
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Parse the model's message content into a feedback block
pub fn parse_feedback(content: &str) -> Result<AiFeedback, GatewayError> {
    let payload: FeedbackPayload = serde_json::from_str(strip_code_fence(content))?;
    let summary = payload.summary.trim().to_string();
    if summary.is_empty() {
        return Err(GatewayError::Decode("feedback has no summary".to_string()));
    }

    Ok(AiFeedback {
        summary,
        recommendations: payload.recommendations,
        health_score: payload
            .health_score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 100.0)),
        goals: payload.goals,
        warnings: payload.warnings,
        generated_at: Utc::now(),
    })
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn analyze_daily_report(
        &self,
        report: &DailyReport,
        profile: &UserProfile,
    ) -> Result<AiFeedback, GatewayError> {
        let input = serde_json::to_string(&AnalysisInput { profile, report })?;
        let language = profile.language_code.as_deref().unwrap_or("en");

        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "system", "content": format!("Write in the language with code: {language}") },
                { "role": "user", "content": input },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let chat: ChatResponse = resp.json().await?;
        let content = chat
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Decode("response has no message content".to_string()))?;
        debug!(chars = content.len(), "Analysis response received");

        parse_feedback(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feedback_full() {
        let feedback = parse_feedback(
            r#"{"summary": "Solid day", "recommendations": ["Drink water"],
                "health_score": 82, "goals": ["10k steps"], "warnings": []}"#,
        )
        .unwrap();

        assert_eq!(feedback.summary, "Solid day");
        assert_eq!(feedback.recommendations, vec!["Drink water"]);
        assert_eq!(feedback.health_score, Some(82.0));
        assert_eq!(feedback.goals, vec!["10k steps"]);
    }

    #[test]
    fn test_parse_feedback_fenced_and_clamped() {
        let feedback =
            parse_feedback("```json\n{\"summary\": \"Ok\", \"healthScore\": 140}\n```").unwrap();
        assert_eq!(feedback.summary, "Ok");
        assert_eq!(feedback.health_score, Some(100.0));
        assert!(feedback.recommendations.is_empty());
    }

    #[test]
    fn test_parse_feedback_rejects_missing_summary() {
        assert!(matches!(
            parse_feedback(r#"{"recommendations": ["x"]}"#),
            Err(GatewayError::Decode(_))
        ));
        assert!(matches!(
            parse_feedback("not json"),
            Err(GatewayError::Decode(_))
        ));
    }
}
