//! Pattern-based transcript extraction
//!
//! Deterministic and side-effect free: every regex is compiled once into an
//! immutable static, and the same transcript always yields the same fields.
//!
//! Passes run in order and each one only fills fields that are still absent:
//! labeled phrases, natural-language introductions, name splitting, phone and
//! email scans, year scan, then vehicle/service keywords.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ExtractionError, Extractor};
use crate::fields::{ExtractedFields, FieldKey};
use leadflow_common::phone::{digit_count, has_valid_length, strip_to_dial_chars};

/// Lowest vehicle year accepted anywhere in the pipeline
pub const MIN_VEHICLE_YEAR: i32 = 1990;

/// Highest vehicle year accepted by transcript extraction and validation
pub const MAX_VEHICLE_YEAR: i32 = 2030;

/// Label phrases recognised in dictated transcripts
///
/// Longer phrases come first so "first name" is tried before "first".
const LABELS: &[(&str, FieldKey)] = &[
    ("first name", FieldKey::FirstName),
    ("last name", FieldKey::LastName),
    ("phone number", FieldKey::Phone),
    ("engine size", FieldKey::EngineSize),
    ("special notes", FieldKey::Notes),
    ("first", FieldKey::FirstName),
    ("last", FieldKey::LastName),
    ("fname", FieldKey::FirstName),
    ("lname", FieldKey::LastName),
    ("name", FieldKey::Name),
    ("phone", FieldKey::Phone),
    ("address", FieldKey::Address),
    ("year", FieldKey::Year),
    ("make", FieldKey::Make),
    ("model", FieldKey::Model),
    ("notes", FieldKey::Notes),
];

/// Vehicle brands matched as whole words, with their canonical spelling
const MAKES: &[(&str, &str)] = &[
    ("honda", "Honda"),
    ("toyota", "Toyota"),
    ("ford", "Ford"),
    ("chevrolet", "Chevrolet"),
    ("chevy", "Chevrolet"),
    ("nissan", "Nissan"),
    ("dodge", "Dodge"),
    ("jeep", "Jeep"),
    ("ram", "Ram"),
    ("bmw", "BMW"),
    ("mercedes", "Mercedes-Benz"),
    ("audi", "Audi"),
    ("lexus", "Lexus"),
    ("hyundai", "Hyundai"),
    ("kia", "Kia"),
    ("mazda", "Mazda"),
    ("subaru", "Subaru"),
    ("volkswagen", "Volkswagen"),
    ("vw", "Volkswagen"),
];

/// Service keywords mapped to the note recorded on the lead, first match wins
const SERVICES: &[(&str, &str)] = &[
    ("oil change", "Oil Change"),
    ("brake", "Brake Service"),
    ("battery", "Battery Replacement"),
    ("alternator", "Alternator Replacement"),
    ("starter", "Starter Replacement"),
    ("check engine", "Engine Diagnostic"),
    ("diagnostic", "Engine Diagnostic"),
    ("timing belt", "Timing Belt"),
    ("ac recharge", "AC Recharge"),
    ("air conditioning", "AC Recharge"),
    ("transmission", "Transmission Service"),
];

/// Words that follow an introduction but are not a name
const NOT_A_NAME: &[&str] = &[
    "from", "in", "at", "of", "calling", "looking", "having", "trying", "going", "just",
    "here", "about", "not", "my", "the", "an", "with", "still", "really", "interested",
];

struct LabelRule {
    key: FieldKey,
    start: Regex,
    stop: Regex,
    /// Indexes of longer labels that contain this one (e.g. "name" in "last name")
    shadowed_by: Vec<usize>,
}

fn word_pattern(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

static LABEL_RULES: Lazy<Vec<LabelRule>> = Lazy::new(|| {
    LABELS
        .iter()
        .enumerate()
        .map(|(i, (label, key))| {
            let start = Regex::new(&format!(
                r"(?i)\b{}\b\s*(?:is\b\s*)?[:\-]?\s*",
                word_pattern(label)
            ))
            .expect("label pattern is escaped");

            let others = LABELS
                .iter()
                .filter(|(other, _)| other != label)
                .map(|(other, _)| word_pattern(other))
                .collect::<Vec<_>>()
                .join("|");
            let stop = Regex::new(&format!(r"(?i)\b(?:{})\b|\s*\bok\b|[.;,\n\r]", others))
                .expect("label pattern is escaped");

            let shadowed_by = LABELS
                .iter()
                .enumerate()
                .filter(|(j, (other, _))| {
                    *j != i
                        && other.len() > label.len()
                        && other.split_whitespace().any(|w| w == *label)
                })
                .map(|(j, _)| j)
                .collect();

            LabelRule {
                key: *key,
                start,
                stop,
                shadowed_by,
            }
        })
        .collect()
});

static FILLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:is|it|the|a|an)\s+").expect("static pattern"));

static YEAR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("static pattern"));

static INTRODUCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:my\s+name\s+is|this\s+is|i\s*am|i'm|it's)\s+(\p{L}[\p{L}'\-]+)(?:\s+(\p{L}[\p{L}'\-]+))?",
    )
    .expect("static pattern")
});

static PHONE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\b\d[\d\s\-().]{6,}\d\b").expect("static pattern"));

/// A year token separated from the end of a numeric run ("904 555 1234 2018")
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-.()]+((?:19|20)\d{2})\s*$").expect("static pattern"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").expect("static pattern")
});

static MAKE_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = MAKES
        .iter()
        .map(|(word, _)| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({})\b(?-i:\s+([A-Z0-9][A-Za-z0-9\-]*))?", alternatives))
        .expect("brand list is escaped")
});

/// Title-case a phrase: first letter of every alphanumeric run upper, rest lower
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_alnum = false;

    for c in value.chars() {
        if c.is_alphanumeric() {
            if prev_alnum {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alnum = true;
        } else {
            out.push(c);
            prev_alnum = false;
        }
    }

    out
}

fn is_year_in_range(value: &str) -> bool {
    value
        .trim()
        .parse::<i32>()
        .map(|y| (MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&y))
        .unwrap_or(false)
}

/// Cut a vehicle year that ran onto the end of a phone number
///
/// Only applies when the run is longer than a North American number with its
/// country code.
fn trim_trailing_year(run: &str) -> &str {
    if digit_count(run) <= 11 {
        return run;
    }
    match TRAILING_YEAR_RE.captures(run) {
        Some(caps) if caps.get(1).map_or(false, |y| is_year_in_range(y.as_str())) => {
            let cut = caps.get(0).map_or(run.len(), |m| m.start());
            &run[..cut]
        }
        _ => run,
    }
}

fn is_not_a_name(token: &str) -> bool {
    NOT_A_NAME.iter().any(|w| w.eq_ignore_ascii_case(token))
}

/// Deterministic extractor backed by regular expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Run every pass over the transcript
    pub fn extract_fields(&self, transcript: &str) -> ExtractedFields {
        let text = transcript.trim();
        let mut fields = ExtractedFields::new();

        extract_labeled(text, &mut fields);
        extract_introduction(text, &mut fields);
        split_combined_name(&mut fields);
        extract_phone_fallback(text, &mut fields);
        extract_email(text, &mut fields);
        extract_year_fallback(text, &mut fields);
        extract_keywords(text, &mut fields);

        fields
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    fn source_id(&self) -> &'static str {
        "pattern"
    }

    async fn extract(&self, transcript: &str) -> Result<ExtractedFields, ExtractionError> {
        Ok(self.extract_fields(transcript))
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Byte spans where longer labels occur, so "name" inside "last name" is skipped
fn shadow_spans(text: &str, rule: &LabelRule) -> Vec<(usize, usize)> {
    rule.shadowed_by
        .iter()
        .flat_map(|&j| LABEL_RULES[j].start.find_iter(text).map(|m| (m.start(), m.end())))
        .collect()
}

fn extract_labeled(text: &str, fields: &mut ExtractedFields) {
    for rule in LABEL_RULES.iter() {
        if fields.contains(rule.key) {
            continue;
        }

        let shadows = shadow_spans(text, rule);
        let Some(m) = rule
            .start
            .find_iter(text)
            .find(|m| !shadows.iter().any(|&(s, e)| m.start() >= s && m.start() < e))
        else {
            continue;
        };

        let end = rule
            .stop
            .find_at(text, m.end())
            .map(|stop| stop.start())
            .unwrap_or(text.len());
        let captured = text[m.end()..end.max(m.end())].trim();
        let mut value = FILLER_RE.replace(captured, "").trim().to_string();

        if rule.key == FieldKey::Year {
            if let Some(token) = YEAR_TOKEN_RE.find(&value) {
                value = token.as_str().to_string();
            }
        }

        if rule.key.is_person_name() {
            value = title_case(&value);
        }

        if rule.key == FieldKey::Phone {
            if let Some(run) = PHONE_RUN_RE.find(&value) {
                value = trim_trailing_year(run.as_str()).to_string();
            }
        }

        fields.insert(rule.key, value);
    }
}

fn extract_introduction(text: &str, fields: &mut ExtractedFields) {
    if fields.contains(FieldKey::Name) {
        return;
    }

    let Some(caps) = INTRODUCTION_RE
        .captures_iter(text)
        .find(|c| c.get(1).map_or(false, |m| !is_not_a_name(m.as_str())))
    else {
        return;
    };

    let first = caps.get(1).map(|m| title_case(m.as_str())).unwrap_or_default();
    let last = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|token| !is_not_a_name(token))
        .map(title_case);

    match last {
        Some(last) => {
            fields.insert(FieldKey::Name, format!("{} {}", first, last));
            fields.insert(FieldKey::FirstName, first);
            fields.insert(FieldKey::LastName, last);
        }
        None => {
            fields.insert(FieldKey::Name, &first);
            fields.insert(FieldKey::FirstName, first);
        }
    }
}

fn split_combined_name(fields: &mut ExtractedFields) {
    if fields.contains(FieldKey::FirstName) || fields.contains(FieldKey::LastName) {
        return;
    }
    let Some(name) = fields.get(FieldKey::Name).map(str::to_string) else {
        return;
    };

    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        [single] => {
            let first = title_case(single);
            fields.insert(FieldKey::FirstName, first);
        }
        [rest @ .., last] => {
            let first = title_case(&rest.join(" "));
            let last = title_case(last);
            fields.insert(FieldKey::FirstName, first);
            fields.insert(FieldKey::LastName, last);
        }
    }
}

fn extract_phone_fallback(text: &str, fields: &mut ExtractedFields) {
    if fields.get(FieldKey::Phone).map_or(false, has_valid_length) {
        return;
    }

    let runs: Vec<String> = PHONE_RUN_RE
        .find_iter(text)
        .map(|m| strip_to_dial_chars(trim_trailing_year(m.as_str())))
        .collect();

    let chosen = runs
        .iter()
        .find(|run| has_valid_length(run))
        .or_else(|| runs.first());

    if let Some(run) = chosen {
        if digit_count(run) > 0 {
            fields.insert(FieldKey::Phone, run);
        }
    }
}

fn extract_email(text: &str, fields: &mut ExtractedFields) {
    if let Some(m) = EMAIL_RE.find(text) {
        fields.insert(FieldKey::Email, m.as_str());
    }
}

fn extract_year_fallback(text: &str, fields: &mut ExtractedFields) {
    if fields.get(FieldKey::Year).map_or(false, is_year_in_range) {
        return;
    }

    if let Some(year) = YEAR_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|token| is_year_in_range(token))
    {
        fields.insert(FieldKey::Year, year);
    }
}

fn extract_keywords(text: &str, fields: &mut ExtractedFields) {
    if !fields.contains(FieldKey::Make) {
        if let Some(caps) = MAKE_RE.captures(text) {
            let canonical = caps.get(1).and_then(|m| {
                MAKES
                    .iter()
                    .find(|(word, _)| word.eq_ignore_ascii_case(m.as_str()))
                    .map(|(_, canonical)| *canonical)
            });

            if let Some(make) = canonical {
                fields.insert(FieldKey::Make, make);

                if let Some(model) = caps.get(2) {
                    fields.insert_if_absent(FieldKey::Model, model.as_str());
                }
            }
        }
    }

    if !fields.contains(FieldKey::Notes) {
        let lower = text.to_lowercase();
        if let Some((_, note)) = SERVICES.iter().find(|(keyword, _)| lower.contains(keyword)) {
            fields.insert(FieldKey::Notes, note);
        }
    }
}
