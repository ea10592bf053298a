//! Domain identifier types with validation
//!
//! Newtype wrappers for FHIR resource types and `Type/id` keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FHIR resource type name newtype wrapper
///
/// # Examples
///
/// ```
/// use conduit::domain::ids::ResourceType;
/// use std::str::FromStr;
///
/// let rt = ResourceType::from_str("Observation").unwrap();
/// assert_eq!(rt.as_str(), "Observation");
/// assert!(ResourceType::from_str("observation").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a new ResourceType
    ///
    /// Resource type names are ASCII alphanumeric and start with an uppercase letter.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err("Resource type cannot be empty".to_string());
        }

        let mut chars = name.chars();
        let first_ok = chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
        if !first_ok || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("Invalid resource type: {name}"));
        }

        Ok(Self(name))
    }

    /// Wraps a resource type name known at compile time
    pub(crate) fn known(name: &'static str) -> Self {
        debug_assert!(Self::new(name).is_ok(), "invalid resource type {name}");
        Self(name.to_string())
    }

    /// Returns the resource type as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A `Type/id` pair identifying one resource on one server
///
/// # Examples
///
/// ```
/// use conduit::domain::ids::ResourceKey;
///
/// let key = ResourceKey::parse("https://ehr.example.com/fhir/Patient/123/_history/4").unwrap();
/// assert_eq!(key.to_string(), "Patient/123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource type
    pub resource_type: ResourceType,
    /// Logical id on the owning server
    pub id: String,
}

impl ResourceKey {
    /// Creates a new key
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }

    /// Parses a literal reference into a key.
    ///
    /// Accepts relative (`Patient/1`), absolute (`https://host/fhir/Patient/1`) and
    /// versioned (`Patient/1/_history/2`) references. Contained (`#x`) and `urn:`
    /// references have no server-side key and yield `None`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with('#') || reference.starts_with("urn:") {
            return None;
        }

        let path = match reference.find("://") {
            Some(idx) => &reference[idx + 3..],
            None => reference,
        };
        let path = path.split(['?', '#']).next().unwrap_or(path);

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if let Some(pos) = segments.iter().position(|s| *s == "_history") {
            segments.truncate(pos);
        }
        if segments.len() < 2 {
            return None;
        }

        let id = segments[segments.len() - 1];
        let resource_type = ResourceType::new(segments[segments.len() - 2]).ok()?;
        Some(Self::new(resource_type, id))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}
