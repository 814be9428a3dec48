//! Logical field → CRM field id resolution
//!
//! Built once from configuration and never mutated.

use std::collections::BTreeMap;
use std::fmt;

use crate::fields::FieldKey;
use leadflow_common::config::parse_field_map_json;
use leadflow_common::{Error, Result};

/// Positive CRM field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(u32);

impl FieldId {
    /// Accept only positive ids that fit the CRM's column naming
    pub fn new(id: i64) -> Option<Self> {
        u32::try_from(id).ok().filter(|id| *id > 0).map(FieldId)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Column holding this field in the entity table (`field_<id>`)
    pub fn column(&self) -> String {
        format!("field_{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable logical key → field id mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: BTreeMap<FieldKey, FieldId>,
}

impl FieldMap {
    /// Build from raw configuration entries
    ///
    /// Unknown logical names are a configuration error. Non-positive ids mean
    /// the field is deliberately unmapped.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut map = BTreeMap::new();
        let mut unknown = Vec::new();

        for (name, id) in entries {
            let Some(key) = FieldKey::from_name(name.trim()) else {
                unknown.push(name.to_string());
                continue;
            };
            if let Some(field_id) = FieldId::new(id) {
                map.insert(key, field_id);
            }
        }

        if !unknown.is_empty() {
            return Err(Error::Config(format!(
                "Unknown field map keys: {}",
                unknown.join(", ")
            )));
        }

        Ok(Self { entries: map })
    }

    /// Build from a JSON object such as `{"phone": 7, "notes": "12"}`
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed = parse_field_map_json(raw)?;
        Self::from_entries(parsed.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    pub fn resolve(&self, key: FieldKey) -> Option<FieldId> {
        self.entries.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, FieldId)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_and_column() {
        let map = FieldMap::from_entries([("phone", 7), ("first_name", 8)]).unwrap();
        let id = map.resolve(FieldKey::Phone).unwrap();
        assert_eq!(id.get(), 7);
        assert_eq!(id.column(), "field_7");
        assert_eq!(map.resolve(FieldKey::Email), None);
    }

    #[test]
    fn test_non_positive_ids_unmapped() {
        let map = FieldMap::from_entries([("phone", 0), ("notes", -3), ("year", 14)]).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.resolve(FieldKey::Phone).is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = FieldMap::from_entries([("phone", 7), ("vin", 9)]).unwrap_err();
        assert!(err.to_string().contains("vin"));
    }

    #[test]
    fn test_from_json_accepts_numeric_strings() {
        let map = FieldMap::from_json(r#"{"phone":"7","engine_size":22}"#).unwrap();
        assert_eq!(map.resolve(FieldKey::EngineSize).map(|f| f.get()), Some(22));
        assert_eq!(map.resolve(FieldKey::Phone).map(|f| f.get()), Some(7));
    }

    #[test]
    fn test_id_out_of_range() {
        assert!(FieldId::new(i64::from(u32::MAX) + 1).is_none());
        assert!(FieldId::new(1).is_some());
    }
}
