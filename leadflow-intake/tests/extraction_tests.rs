//! Transcript extraction: reference calls, purity, and the language-model chain

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadflow_common::config::OpenAiConfig;
use leadflow_intake::extraction::pattern::PatternExtractor;
use leadflow_intake::extraction::ExtractionChain;
use leadflow_intake::fields::FieldKey;
use leadflow_intake::validation::validate;

const JENNIFER: &str =
    "Hi, this is Jennifer Martinez calling about my car. My phone number is 904-555-8765";

const SARAH: &str =
    "my name is Sarah Johnson, 2018 Honda Accord, check engine light, call 904-555-7890";

#[test]
fn test_introduction_transcript() {
    let fields = PatternExtractor::new().extract_fields(JENNIFER);

    assert_eq!(fields.get(FieldKey::FirstName), Some("Jennifer"));
    assert_eq!(fields.get(FieldKey::LastName), Some("Martinez"));
    assert_eq!(fields.get(FieldKey::Phone), Some("9045558765"));
}

#[test]
fn test_labeled_name_with_vehicle_and_service() {
    let fields = PatternExtractor::new().extract_fields(SARAH);

    assert_eq!(fields.get(FieldKey::FirstName), Some("Sarah"));
    assert_eq!(fields.get(FieldKey::LastName), Some("Johnson"));
    assert_eq!(fields.get(FieldKey::Year), Some("2018"));
    assert_eq!(fields.get(FieldKey::Make), Some("Honda"));
    assert_eq!(fields.get(FieldKey::Model), Some("Accord"));
    assert_eq!(fields.get(FieldKey::Phone), Some("9045557890"));
    assert_eq!(fields.get(FieldKey::Notes), Some("Engine Diagnostic"));

    let validated = validate(&fields);
    assert_eq!(validated.len(), fields.len());
    assert_eq!(validated.get(FieldKey::Phone), Some("9045557890"));
}

#[test]
fn test_extraction_is_pure() {
    let extractor = PatternExtractor::new();
    for transcript in [JENNIFER, SARAH, "", "ok thanks bye"] {
        assert_eq!(extractor.extract_fields(transcript), extractor.extract_fields(transcript));
    }
}

fn openai_config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: Some("sk-test".into()),
        api_url: format!("{}/v1/chat/completions", server.uri()),
        ..Default::default()
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn test_language_model_preferred_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"first_name\":\"Jennifer\",\"last_name\":\"Martinez\",\"phone\":\"(904) 555-8765\",\"year\":null,\"make\":\"null\"}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let chain = ExtractionChain::from_config(&openai_config(&server)).unwrap();
    let outcome = chain.extract(JENNIFER).await;

    assert_eq!(outcome.source, "openai");
    assert_eq!(outcome.fields.get(FieldKey::Phone), Some("9045558765"));
    assert!(!outcome.fields.contains(FieldKey::Year));
    assert!(!outcome.fields.contains(FieldKey::Make));
}

#[tokio::test]
async fn test_service_error_falls_back_to_patterns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let chain = ExtractionChain::from_config(&openai_config(&server)).unwrap();
    let outcome = chain.extract(SARAH).await;

    assert_eq!(outcome.source, "pattern");
    assert_eq!(outcome.fields, PatternExtractor::new().extract_fields(SARAH));
}

#[tokio::test]
async fn test_malformed_model_output_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sure! The caller is Sarah.")))
        .mount(&server)
        .await;

    let chain = ExtractionChain::from_config(&openai_config(&server)).unwrap();
    let outcome = chain.extract(SARAH).await;

    assert_eq!(outcome.source, "pattern");
    assert_eq!(outcome.fields.get(FieldKey::FirstName), Some("Sarah"));
}

#[tokio::test]
async fn test_no_api_key_uses_patterns_only() {
    let chain = ExtractionChain::from_config(&OpenAiConfig::default()).unwrap();
    let outcome = chain.extract(JENNIFER).await;
    assert_eq!(outcome.source, "pattern");
}

#[tokio::test]
async fn test_slow_model_times_out_and_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"first_name":"Wrong","phone":"9045550000"}"#))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = OpenAiConfig {
        timeout_secs: 1,
        ..openai_config(&server)
    };
    let chain = ExtractionChain::from_config(&config).unwrap();
    let outcome = chain.extract(JENNIFER).await;

    assert_eq!(outcome.source, "pattern");
    assert_eq!(outcome.fields.get(FieldKey::FirstName), Some("Jennifer"));
    assert_eq!(outcome.fields.get(FieldKey::Phone), Some("9045558765"));
}
