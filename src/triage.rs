//! Symptom-to-specialty routing backed by a generative text model.

use std::{error::Error, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Used when the model's answer names none of the known specialties.
pub const FALLBACK_SPECIALTY: &str = "General Physician";

#[async_trait]
pub trait SpecialtyRouter: Send + Sync + 'static {
    /// Return the model's free-text answer naming one of `specialties`.
    async fn route(
        &self,
        symptoms: &str,
        specialties: &[String],
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

pub struct GeminiRouter {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiRouter {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            endpoint: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                model
            ),
            client: reqwest::Client::new(),
        }
    }
}

pub fn build_prompt(symptoms: &str, specialties: &[String]) -> String {
    format!(
        "You are a hospital triage assistant. A patient reports the following symptoms:\n\
         \"{symptoms}\"\n\n\
         Choose the single most appropriate medical specialty from this list:\n\
         {list}\n\n\
         Reply with only the specialty name exactly as written in the list, nothing else.",
        symptoms = symptoms.trim(),
        list = specialties.join(", "),
    )
}

/// Map a model answer onto one of the known specialties, ignoring case,
/// punctuation and surrounding chatter.
pub fn match_specialty(answer: &str, specialties: &[String]) -> String {
    let cleaned = answer
        .trim()
        .trim_matches(|c: char| c == '.' || c == '"' || c == '*' || c == '\'')
        .trim();

    if let Some(exact) = specialties
        .iter()
        .find(|s| s.eq_ignore_ascii_case(cleaned))
    {
        return exact.clone();
    }

    let lowered = cleaned.to_ascii_lowercase();
    specialties
        .iter()
        .find(|s| lowered.contains(&s.to_ascii_lowercase()))
        .cloned()
        .unwrap_or_else(|| FALLBACK_SPECIALTY.to_string())
}

#[async_trait]
impl SpecialtyRouter for GeminiRouter {
    async fn route(
        &self,
        symptoms: &str,
        specialties: &[String],
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let payload = json!({
            "contents": [{
                "parts": [{ "text": build_prompt(symptoms, specialties) }]
            }],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": 32
            }
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or("model response had no text candidate")?;

        debug!(answer = %text.trim(), "triage model answered");
        Ok(text.to_string())
    }
}
