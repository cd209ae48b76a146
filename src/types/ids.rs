use super::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier the catalog API assigns to a resource.
///
/// The API hands out ids as strings for some kinds and integers for others;
/// both normalize to their decimal/string form here. Ids are only unique
/// within an [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Validates and wraps an id. Surrounding whitespace is trimmed.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidId(
                "resource id cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ValidationError::InvalidId(format!(
                "resource id contains control characters: {:?}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wraps an integer id as returned by some endpoints.
    pub fn from_number(value: u64) -> Self {
        Self(value.to_string())
    }

    /// Pseudo id of the catalog root; the course listing task is keyed on it.
    pub fn catalog_root() -> Self {
        Self("catalog".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ResourceId::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// The closed set of record kinds the crawler persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Course,
    Chapter,
    Subchapter,
    Video,
    RelatedResource,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Course,
        EntityKind::Chapter,
        EntityKind::Subchapter,
        EntityKind::Video,
        EntityKind::RelatedResource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Course => "course",
            EntityKind::Chapter => "chapter",
            EntityKind::Subchapter => "subchapter",
            EntityKind::Video => "video",
            EntityKind::RelatedResource => "related_resource",
        }
    }

    /// Parses the lowercase name used in the `related_resources.parent_kind`
    /// column.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_empty() {
        assert_eq!(ResourceId::parse("  abc-1 ").unwrap().as_str(), "abc-1");
        assert!(ResourceId::parse("   ").is_err());
        assert!(ResourceId::parse("a\nb").is_err());
    }

    #[test]
    fn numeric_ids_normalize_to_strings() {
        assert_eq!(ResourceId::from_number(42), ResourceId::parse("42").unwrap());
    }

    #[test]
    fn entity_kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_name("lecture"), None);
    }
}
