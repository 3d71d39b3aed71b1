//! Canonical laboratory Observation as served to FHIR clients.

use rust_decimal::Decimal;
use serde::Serialize;

pub const CATEGORY_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/observation-category";

/// FHIR R4 Observation, restricted to what the labsvar mapping fills in.
///
/// Built in one go by [`crate::mapper::LabMapper`]; there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resourceType", rename = "Observation", rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,
    pub status: ObservationStatus,
    pub category: Vec<CodeableConcept>,
    pub code: CodeableConcept,
    #[serde(flatten)]
    pub value: Option<ObservationValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_range: Vec<ReferenceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    pub subject: Reference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<Annotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Final,
    Preliminary,
    Cancelled,
    Unknown,
}

/// `value[x]`: only one of the two is ever present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObservationValue {
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    #[serde(rename = "valueString")]
    Text(String),
}

/// `value` is written as a JSON number carrying its original scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeableConcept {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRange {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub text: String,
}

impl CodeableConcept {
    /// The fixed `laboratory` category every mapped result carries.
    pub fn laboratory() -> Self {
        Self {
            coding: vec![Coding {
                system: CATEGORY_SYSTEM.to_string(),
                code: "laboratory".to_string(),
                display: Some("Laboratory".to_string()),
            }],
            text: None,
        }
    }
}

impl Reference {
    pub fn display(display: impl Into<String>) -> Self {
        Self {
            identifier: None,
            display: Some(display.into()),
        }
    }
}

impl Observation {
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: Option<ObservationValue>) -> Observation {
        Observation {
            id: "lab-rek-1".to_string(),
            identifier: Vec::new(),
            status: ObservationStatus::Final,
            category: vec![CodeableConcept::laboratory()],
            code: CodeableConcept {
                coding: Vec::new(),
                text: Some("P-Kalium".to_string()),
            },
            value,
            reference_range: Vec::new(),
            effective_date_time: None,
            issued: None,
            performer: Vec::new(),
            subject: Reference {
                identifier: Some(Identifier {
                    system: "urn:dk:cpr".to_string(),
                    value: "0101010101".to_string(),
                }),
                display: None,
            },
            note: Vec::new(),
        }
    }

    #[test]
    fn test_serializes_as_fhir_observation() {
        let json = sample(None).to_value().unwrap();
        assert_eq!(json["resourceType"], "Observation");
        assert_eq!(json["id"], "lab-rek-1");
        assert_eq!(json["status"], "final");
        assert_eq!(json["category"][0]["coding"][0]["code"], "laboratory");
        assert_eq!(json["subject"]["identifier"]["system"], "urn:dk:cpr");
        assert!(json.get("identifier").is_none());
        assert!(json.get("valueQuantity").is_none());
        assert!(json.get("valueString").is_none());
    }

    #[test]
    fn test_quantity_value_field() {
        let observation = sample(Some(ObservationValue::Quantity(Quantity {
            value: Decimal::new(420, 2),
            unit: Some("mmol/L".to_string()),
        })));
        let json = observation.to_value().unwrap();
        assert_eq!(json["valueQuantity"]["value"], 4.2);
        assert!(json["valueQuantity"]["value"].is_number());
        assert!(
            serde_json::to_string(&json)
                .unwrap()
                .contains(r#""value":4.20"#)
        );
        assert_eq!(json["valueQuantity"]["unit"], "mmol/L");
        assert!(json.get("valueString").is_none());
    }

    #[test]
    fn test_string_value_field() {
        let observation = sample(Some(ObservationValue::Text("Ikke påvist".to_string())));
        let json = observation.to_value().unwrap();
        assert_eq!(json["valueString"], "Ikke påvist");
    }
}
