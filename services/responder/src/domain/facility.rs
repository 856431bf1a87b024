//! Response facility records

use std::fmt;
use std::str::FromStr;

use errors::{ResponderError, ResponderResult};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Kind of response center
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FacilityCategory {
    Hospital,
    Clinic,
    Police,
    Fire,
    General,
    Other(String),
}

impl FromStr for FacilityCategory {
    type Err = ResponderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        Ok(match normalized.as_str() {
            "" | "general" => Self::General,
            "hospital" | "medical" => Self::Hospital,
            "clinic" | "doctors" => Self::Clinic,
            "police" | "police station" => Self::Police,
            "fire" | "fire station" | "fire department" => Self::Fire,
            _ => Self::Other(normalized),
        })
    }
}

impl TryFrom<String> for FacilityCategory {
    type Error = ResponderError;

    fn try_from(value: String) -> ResponderResult<Self> {
        value.parse()
    }
}

impl From<FacilityCategory> for String {
    fn from(category: FacilityCategory) -> Self {
        category.to_string()
    }
}

impl fmt::Display for FacilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hospital => write!(f, "hospital"),
            Self::Clinic => write!(f, "clinic"),
            Self::Police => write!(f, "police"),
            Self::Fire => write!(f, "fire"),
            Self::General => write!(f, "general"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

impl Default for FacilityCategory {
    fn default() -> Self {
        Self::General
    }
}

/// A registered response center, read-only to this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique within a directory (case-insensitive)
    pub name: String,
    pub location: String,
    #[serde(alias = "state")]
    pub region: String,
    #[serde(alias = "type", default)]
    pub category: FacilityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

impl Facility {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Registration request body for `POST /register`
#[derive(Debug, Clone, PartialEq)]
pub struct NewFacility {
    pub name: String,
    pub location: String,
    pub region: String,
    pub category: FacilityCategory,
}

// Directory backends read either `region`/`category` or `state`/`type`
impl Serialize for NewFacility {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let category = self.category.to_string();
        let mut body = serializer.serialize_struct("NewFacility", 6)?;
        body.serialize_field("name", &self.name)?;
        body.serialize_field("location", &self.location)?;
        body.serialize_field("region", &self.region)?;
        body.serialize_field("state", &self.region)?;
        body.serialize_field("category", &category)?;
        body.serialize_field("type", &category)?;
        body.end()
    }
}

impl NewFacility {
    /// Trim every field and reject blanks, naming the first blank field
    pub fn validated(
        name: &str,
        location: &str,
        region: &str,
        category: &str,
    ) -> ResponderResult<Self> {
        let required = [("name", name), ("location", location), ("region", region)];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ResponderError::validation(
                *field,
                format!("{} is required", field),
            ));
        }

        Ok(Self {
            name: name.trim().to_string(),
            location: location.trim().to_string(),
            region: region.trim().to_string(),
            category: category.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_parsing_is_lenient() {
        assert_eq!("Hospital".parse::<FacilityCategory>().unwrap(), FacilityCategory::Hospital);
        assert_eq!("fire_station".parse::<FacilityCategory>().unwrap(), FacilityCategory::Fire);
        assert_eq!("".parse::<FacilityCategory>().unwrap(), FacilityCategory::General);
        assert_eq!(
            "Coast Guard".parse::<FacilityCategory>().unwrap(),
            FacilityCategory::Other("coast guard".into())
        );
    }

    #[test]
    fn test_facility_accepts_backend_field_names() {
        let facility: Facility = serde_json::from_value(json!({
            "id": "center_1_1700000000",
            "name": "Central Hospital",
            "location": "Andheri",
            "state": "Maharashtra",
            "type": "Hospital",
            "registered_at": "2025-03-01T09:00:00"
        }))
        .unwrap();

        assert_eq!(facility.region, "Maharashtra");
        assert_eq!(facility.category, FacilityCategory::Hospital);
        assert!(facility.matches_name(" central hospital "));
    }

    #[test]
    fn test_validation_names_first_blank_field() {
        let err = NewFacility::validated("Central", "  ", "", "police").unwrap_err();
        match err {
            ResponderError::Validation { field, .. } => assert_eq!(field, "location"),
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = NewFacility::validated(" Central ", "Andheri", "MH", "").unwrap();
        assert_eq!(ok.name, "Central");
        assert_eq!(ok.category, FacilityCategory::General);
    }

    #[test]
    fn test_registration_body_carries_both_field_names() {
        let body = serde_json::to_value(
            NewFacility::validated("Station 9", "Dadar", "MH", "fire").unwrap(),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({
                "name": "Station 9",
                "location": "Dadar",
                "region": "MH",
                "state": "MH",
                "category": "fire",
                "type": "fire"
            })
        );
    }

    #[test]
    fn test_clinic_category_survives_registration() {
        let request = NewFacility::validated("Bandra Clinic", "Bandra", "MH", "Clinic").unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["category"], "clinic");
        assert_eq!(body["type"], "clinic");

        // Echoed back the way the directory stores it
        let stored: Facility = serde_json::from_value(json!({
            "name": body["name"],
            "location": body["location"],
            "state": body["state"],
            "type": body["type"]
        }))
        .unwrap();
        assert_eq!(stored.category, FacilityCategory::Clinic);
        assert_eq!(stored.region, "MH");
    }
}
