//! Language-model transcript extraction
//!
//! Sends the transcript to an OpenAI-compatible chat completions endpoint with
//! a fixed instruction prompt and parses the JSON object it answers with.
//! Every failure is an [`ExtractionError`]; the chain turns it into a pattern
//! fallback.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::pattern::{MAX_VEHICLE_YEAR, MIN_VEHICLE_YEAR};
use super::{ExtractionError, Extractor};
use crate::fields::{ExtractedFields, FieldKey};
use leadflow_common::config::OpenAiConfig;
use leadflow_common::phone::{digits_only, MIN_PHONE_DIGITS};

/// Keys requested from the model, in prompt order
const REQUESTED_KEYS: [FieldKey; 9] = [
    FieldKey::FirstName,
    FieldKey::LastName,
    FieldKey::Phone,
    FieldKey::Address,
    FieldKey::Year,
    FieldKey::Make,
    FieldKey::Model,
    FieldKey::Engine,
    FieldKey::Notes,
];

const PROMPT: &str = r#"You are analyzing a phone call transcript for a mobile mechanic service. Extract customer information and return ONLY a JSON object with these exact keys (use null for missing data):

{
  "first_name": "customer's first name",
  "last_name": "customer's last name",
  "phone": "phone number in format like 9045551234 (digits only)",
  "address": "location/address mentioned",
  "year": "vehicle year (4 digits)",
  "make": "vehicle make/brand",
  "model": "vehicle model",
  "engine": "engine size/type if mentioned",
  "notes": "problem description or service needed"
}

Rules:
- Extract actual customer info, not business/agent details
- For phone: digits only, no formatting
- For year: must be 4-digit year between 1990-2030
- For make/model: standardize common brands (Honda, Toyota, etc.)
- For notes: summarize the actual problem/service needed
- Return null for any field that's not clearly stated

Transcript: "#;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions backed extractor
pub struct AiExtractor {
    http_client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AiExtractor {
    /// Build from configuration; fails when no API key is set
    pub fn new(config: &OpenAiConfig) -> Result<Self, ExtractionError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ExtractionError::NotAvailable("OpenAI API key not configured".to_string()))?
            .to_string();

        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::NotAvailable(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn complete(&self, transcript: &str) -> Result<String, ExtractionError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{}{}", PROMPT, transcript),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Network(format!("Chat completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!(
                "Chat completion returned {}: {}",
                status, body
            )));
        }

        let envelope: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(format!("Invalid chat completion envelope: {}", e)))?;

        envelope
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::Parse("Chat completion had no choices".to_string()))
    }
}

#[async_trait]
impl Extractor for AiExtractor {
    fn source_id(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn extract(&self, transcript: &str) -> Result<ExtractedFields, ExtractionError> {
        let content = self.complete(transcript).await?;
        let fields = parse_model_output(&content)?;
        debug!(count = fields.len(), "Language-model extraction parsed");
        Ok(fields)
    }
}

/// Remove a surrounding markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse and clean the model's JSON answer
///
/// Keeps only requested keys; drops blank and `"null"` values; phone reduced to
/// digits and dropped below ten; year dropped outside the accepted range.
pub fn parse_model_output(content: &str) -> Result<ExtractedFields, ExtractionError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(strip_code_fence(content)).map_err(|e| {
            ExtractionError::Parse(format!("Model output is not a JSON object: {}", e))
        })?;

    let mut fields = ExtractedFields::new();

    for key in REQUESTED_KEYS {
        let value = match object.get(key.as_str()) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue,
        };

        if value.is_empty() || value.eq_ignore_ascii_case("null") {
            continue;
        }

        match key {
            FieldKey::Phone => {
                let digits = digits_only(&value);
                if digits.len() >= MIN_PHONE_DIGITS {
                    fields.insert(key, digits);
                }
            }
            FieldKey::Year => {
                let in_range = value
                    .parse::<i32>()
                    .map(|y| (MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&y))
                    .unwrap_or(false);
                if in_range {
                    fields.insert(key, value);
                }
            }
            _ => {
                fields.insert(key, value);
            }
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cleans_values() {
        let fields = parse_model_output(
            r#"{"first_name":" Sarah ","last_name":"null","phone":"(904) 555-7890",
                "address":null,"year":2018,"make":"Honda","model":"","engine":"2.4L","notes":"Check engine light"}"#,
        )
        .unwrap();

        assert_eq!(fields.get(FieldKey::FirstName), Some("Sarah"));
        assert!(!fields.contains(FieldKey::LastName));
        assert_eq!(fields.get(FieldKey::Phone), Some("9045557890"));
        assert!(!fields.contains(FieldKey::Address));
        assert_eq!(fields.get(FieldKey::Year), Some("2018"));
        assert!(!fields.contains(FieldKey::Model));
        assert_eq!(fields.get(FieldKey::Engine), Some("2.4L"));
    }

    #[test]
    fn test_short_phone_and_old_year_dropped() {
        let fields = parse_model_output(r#"{"phone":"555-1234","year":"1985"}"#).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_code_fence_tolerated() {
        let fields = parse_model_output("```json\n{\"make\": \"Kia\"}\n```").unwrap();
        assert_eq!(fields.get(FieldKey::Make), Some("Kia"));
    }

    #[test]
    fn test_unrequested_keys_ignored() {
        let fields = parse_model_output(r#"{"email":"a@b.co","make":"Ford"}"#).unwrap();
        assert!(!fields.contains(FieldKey::Email));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_non_json_is_parse_error() {
        let err = parse_model_output("Sure! The customer is Sarah.").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(matches!(
            AiExtractor::new(&OpenAiConfig::default()),
            Err(ExtractionError::NotAvailable(_))
        ));
    }
}
