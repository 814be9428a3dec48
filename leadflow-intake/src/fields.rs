//! Logical lead fields
//!
//! [`ExtractedFields`] is what an extractor produces; [`ValidatedFields`] is the
//! subset that passed [`crate::validation::validate`] and the only input the CRM
//! writer accepts.

use leadflow_common::phone::strip_to_dial_chars;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical field names shared by extraction, validation and the CRM field map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    FirstName,
    LastName,
    Name,
    Phone,
    Address,
    Year,
    Make,
    Model,
    Engine,
    EngineSize,
    Notes,
    Email,
}

impl FieldKey {
    pub const ALL: [FieldKey; 12] = [
        FieldKey::FirstName,
        FieldKey::LastName,
        FieldKey::Name,
        FieldKey::Phone,
        FieldKey::Address,
        FieldKey::Year,
        FieldKey::Make,
        FieldKey::Model,
        FieldKey::Engine,
        FieldKey::EngineSize,
        FieldKey::Notes,
        FieldKey::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::FirstName => "first_name",
            FieldKey::LastName => "last_name",
            FieldKey::Name => "name",
            FieldKey::Phone => "phone",
            FieldKey::Address => "address",
            FieldKey::Year => "year",
            FieldKey::Make => "make",
            FieldKey::Model => "model",
            FieldKey::Engine => "engine",
            FieldKey::EngineSize => "engine_size",
            FieldKey::Notes => "notes",
            FieldKey::Email => "email",
        }
    }

    /// Look up a key by its snake_case name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Person-name fields, title-cased by the pattern extractor
    pub fn is_person_name(&self) -> bool {
        matches!(self, FieldKey::FirstName | FieldKey::LastName | FieldKey::Name)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw extraction output
///
/// Every stored value is trimmed and non-empty; `phone` holds only digits and `+`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractedFields(BTreeMap<FieldKey, String>);

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one
    ///
    /// Returns false (and stores nothing) when the cleaned value is empty.
    pub fn insert(&mut self, key: FieldKey, value: impl AsRef<str>) -> bool {
        let trimmed = value.as_ref().trim();
        let cleaned = if key == FieldKey::Phone {
            strip_to_dial_chars(trimmed)
        } else {
            trimmed.to_string()
        };

        if cleaned.is_empty() {
            return false;
        }
        self.0.insert(key, cleaned);
        true
    }

    /// Store a value only when the key is absent
    pub fn insert_if_absent(&mut self, key: FieldKey, value: impl AsRef<str>) -> bool {
        if self.0.contains_key(&key) {
            return false;
        }
        self.insert(key, value)
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn remove(&mut self, key: FieldKey) -> Option<String> {
        self.0.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl<V: AsRef<str>> FromIterator<(FieldKey, V)> for ExtractedFields {
    fn from_iter<I: IntoIterator<Item = (FieldKey, V)>>(iter: I) -> Self {
        let mut fields = ExtractedFields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

/// Fields that passed validation
///
/// Only [`crate::validation::validate`] constructs these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedFields(BTreeMap<FieldKey, String>);

impl ValidatedFields {
    pub(crate) fn from_map(map: BTreeMap<FieldKey, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Copy of the underlying map for payload assembly
    pub fn to_map(&self) -> BTreeMap<FieldKey, String> {
        self.0.clone()
    }
}
