//! External identity lookup used to enrich patient packets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

/// Length of a well-formed personal identity code (`DDMMYYCZZZQ`).
pub const PERSONAL_ID_LEN: usize = 11;

/// Returns true if `personal_id` has the shape the registry accepts.
///
/// Only the length and character class are checked; the registry decides
/// whether the code exists.
pub fn is_well_formed_personal_id(personal_id: &str) -> bool {
    personal_id.len() == PERSONAL_ID_LEN
        && personal_id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+'))
}

/// Demographic fields derived from the population registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Given names.
    pub first_names: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Street address.
    pub street_address: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Municipality of residence.
    pub municipality: Option<String>,
}

/// An identity registry.
///
/// A miss (`None`) is an ordinary outcome: the patient is written with the
/// locally known fields and flagged incomplete.
pub trait IdentityLookup: Send + Sync {
    /// Looks up a well-formed personal identity code.
    fn lookup(&self, personal_id: &str) -> Option<IdentityRecord>;
}

/// An identity registry held in memory.
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    entries: HashMap<String, IdentityRecord>,
}

impl MapLookup {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, personal_id: impl Into<String>, record: IdentityRecord) {
        self.entries.insert(personal_id.into(), record);
    }

    /// Reads a JSON object mapping personal ids to identity records.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JSON of that shape.
    pub fn from_json(reader: impl Read) -> serde_json::Result<Self> {
        let entries = serde_json::from_reader(reader)?;
        Ok(Self { entries })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityLookup for MapLookup {
    fn lookup(&self, personal_id: &str) -> Option<IdentityRecord> {
        self.entries.get(personal_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_id_shape() {
        assert!(is_well_formed_personal_id("010180-123A"));
        assert!(is_well_formed_personal_id("010100A123B"));
        assert!(!is_well_formed_personal_id("010180-123"));
        assert!(!is_well_formed_personal_id("010180 123A"));
        assert!(!is_well_formed_personal_id(""));
    }

    #[test]
    fn map_lookup_from_json() {
        let json = r#"{
            "010180-123A": { "first_names": "Aino", "last_name": "Virtanen",
                             "street_address": null, "postal_code": "00100",
                             "municipality": "Helsinki" }
        }"#;
        let lookup = MapLookup::from_json(json.as_bytes()).unwrap();
        assert_eq!(lookup.len(), 1);
        let hit = lookup.lookup("010180-123A").unwrap();
        assert_eq!(hit.last_name.as_deref(), Some("Virtanen"));
        assert!(lookup.lookup("020280-456B").is_none());
    }
}
