use serde::{Deserialize, Serialize};

use super::{null_as_default, null_as_true};

/// A practitioner or organisation listed in the directory.
///
/// Rows from the backend use snake_case columns while older bundled data uses
/// camelCase, so both spellings are accepted on input. Output is always
/// snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Service {
    pub id: i64,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default, alias = "shortDescription")]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
    #[serde(default = "default_true", alias = "isActive", deserialize_with = "null_as_true")]
    pub is_active: bool,
    #[serde(default)]
    pub practitioner: Option<String>,
    #[serde(default, alias = "practitionerTitle")]
    pub practitioner_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub details: Option<ServiceDetails>,
}

/// Long-form notes shown on a service's detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ServiceDetails {
    pub focus: Option<String>,
    pub approach: Option<String>,
    pub philosophy: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Service {
    /// Phone numbers to offer, direct line first.
    pub fn contact_numbers(&self) -> Vec<&str> {
        [self.phone.as_deref(), self.office.as_deref()]
            .into_iter()
            .flatten()
            .filter(|n| !n.trim().is_empty())
            .collect()
    }

    /// "Practitioner, Title" when both are known.
    pub fn display_practitioner(&self) -> Option<String> {
        match (&self.practitioner, &self.practitioner_title) {
            (Some(name), Some(title)) => Some(format!("{}, {}", name, title)),
            (Some(name), None) => Some(name.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_camel_case_columns() {
        let json = r#"{
            "id": 1,
            "title": "Psychology Services",
            "shortDescription": "Professional psychological support",
            "category": "mental_wellness",
            "isActive": false,
            "practitionerTitle": "Counselling Psychologist"
        }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert_eq!(service.short_description.as_deref(), Some("Professional psychological support"));
        assert!(!service.is_active);
        assert_eq!(service.practitioner_title.as_deref(), Some("Counselling Psychologist"));
        assert!(service.features.is_empty());
    }

    #[test]
    fn test_missing_title_is_rejected() {
        let json = r#"{ "id": 1, "category": "mental_wellness" }"#;
        assert!(serde_json::from_str::<Service>(json).is_err());
    }

    #[test]
    fn test_null_columns_read_as_defaults() {
        let json = r#"{ "id": 1, "title": "Psychology", "category": "mental_wellness",
                        "features": null, "is_active": null, "subtitle": null, "details": null }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert!(service.features.is_empty());
        assert!(service.is_active);
        assert_eq!(service.subtitle, None);
        assert_eq!(service.details, None);
    }

    #[test]
    fn test_null_title_is_rejected() {
        let json = r#"{ "id": 1, "title": null, "category": "mental_wellness" }"#;
        assert!(serde_json::from_str::<Service>(json).is_err());
    }

    #[test]
    fn test_is_active_defaults_to_true() {
        let json = r#"{ "id": 7, "title": "Coaching", "category": "hypnotherapy" }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert!(service.is_active);
    }

    #[test]
    fn test_contact_numbers_skips_blank() {
        let json = r#"{ "id": 7, "title": "Coaching", "category": "hypnotherapy",
                        "phone": "+27310350208", "office": " " }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert_eq!(service.contact_numbers(), vec!["+27310350208"]);
    }
}
