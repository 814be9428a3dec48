//! Conversational-intelligence webhook payloads
//!
//! Provider payloads vary in shape; the transcript is found by key anywhere in
//! the document and insights are read from the top level or an `insights`
//! object.

use serde::Serialize;
use serde_json::Value;

use super::call_ingestion::RecordingWebhook;

/// Keys that may hold transcript text, in priority order
pub const TRANSCRIPT_KEYS: [&str; 5] = [
    "transcript",
    "text",
    "content",
    "transcription_text",
    "media_transcript",
];

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Depth-first search for the first non-empty transcript string
///
/// Candidate keys of an object are checked before its nested values.
pub fn find_transcript(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => TRANSCRIPT_KEYS
            .iter()
            .find_map(|key| non_empty_str(map.get(*key)))
            .or_else(|| map.values().find_map(find_transcript)),
        Value::Array(items) => items.iter().find_map(find_transcript),
        _ => None,
    }
}

/// Conversation insights forwarded with the transcript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CiInsights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Comma separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<String>,
    /// One item per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_items: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
}

impl CiInsights {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Join list entries that are strings or objects carrying `item_key`
fn join_list(value: Option<&Value>, item_key: &str, separator: &str) -> Option<String> {
    let items: Vec<String> = value?
        .as_array()?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) => non_empty_str(item.get(item_key)),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();

    (!items.is_empty()).then(|| items.join(separator))
}

/// Read insights from the payload, top level first
pub fn extract_insights(json: &Value) -> CiInsights {
    let nested = json.get("insights");
    let either = |key: &str| non_empty_str(json.get(key)).or_else(|| non_empty_str(nested.and_then(|n| n.get(key))));

    let sentiment = non_empty_str(json.get("sentiment")).or_else(|| {
        let inner = nested?.get("sentiment")?;
        match inner {
            Value::Object(_) => inner.get("overall").map(|o| match o {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            }),
            _ => non_empty_str(Some(inner)),
        }
    });

    CiInsights {
        summary: either("summary").or_else(|| non_empty_str(json.get("conversation_summary"))),
        sentiment,
        topics: join_list(json.get("topics"), "name", ", ")
            .or_else(|| join_list(nested.and_then(|n| n.get("topics")), "name", ", ")),
        action_items: join_list(json.get("action_items"), "text", "\n")
            .or_else(|| join_list(nested.and_then(|n| n.get("action_items")), "text", "\n")),
        intent: either("intent"),
        urgency: either("urgency"),
    }
}

/// Translate a CI payload into the recording webhook the orchestrator takes
pub fn to_recording_webhook(json: &Value) -> RecordingWebhook {
    RecordingWebhook {
        recording_sid: non_empty_str(json.get("recording_sid"))
            .or_else(|| non_empty_str(json.get("transcript_sid"))),
        call_sid: non_empty_str(json.get("call_sid")),
        from: non_empty_str(json.get("from")),
        to: non_empty_str(json.get("to")),
        transcription_text: find_transcript(json),
        insights: extract_insights(json),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transcript_found_in_nested_structure() {
        let payload = json!({
            "event": "transcript.completed",
            "data": {
                "channels": [{"speaker": 1}, {"sentences": {"content": "  my name is Sarah  "}}]
            }
        });
        assert_eq!(find_transcript(&payload).as_deref(), Some("my name is Sarah"));
    }

    #[test]
    fn test_top_level_key_priority() {
        let payload = json!({"text": "second", "transcript": "first", "nested": {"transcript": "deep"}});
        assert_eq!(find_transcript(&payload).as_deref(), Some("first"));

        let blank = json!({"transcript": "   ", "other": {"text": "fallback"}});
        assert_eq!(find_transcript(&blank).as_deref(), Some("fallback"));
        assert_eq!(find_transcript(&json!({"n": 1})), None);
    }

    #[test]
    fn test_insights_from_top_level_and_nested() {
        let payload = json!({
            "summary": "Brake noise on 2018 Civic",
            "topics": ["brakes", {"name": "pricing"}, 3],
            "insights": {
                "sentiment": {"overall": "positive"},
                "action_items": [{"text": "call back"}, "send quote"],
                "urgency": "high"
            }
        });
        let insights = extract_insights(&payload);
        assert_eq!(insights.summary.as_deref(), Some("Brake noise on 2018 Civic"));
        assert_eq!(insights.sentiment.as_deref(), Some("positive"));
        assert_eq!(insights.topics.as_deref(), Some("brakes, pricing"));
        assert_eq!(insights.action_items.as_deref(), Some("call back\nsend quote"));
        assert_eq!(insights.urgency.as_deref(), Some("high"));
        assert_eq!(insights.intent, None);
    }

    #[test]
    fn test_recording_id_falls_back_to_transcript_sid() {
        let webhook = to_recording_webhook(&json!({"transcript_sid": "GT123", "from": "+19045551234"}));
        assert_eq!(webhook.recording_sid.as_deref(), Some("GT123"));
        assert_eq!(webhook.from.as_deref(), Some("+19045551234"));
        assert!(webhook.insights.is_empty());

        let webhook = to_recording_webhook(&json!({"recording_sid": "RE1", "transcript_sid": "GT123"}));
        assert_eq!(webhook.recording_sid.as_deref(), Some("RE1"));
    }
}
