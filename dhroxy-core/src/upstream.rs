//! Wire model of the labsvar "svaroversigt" payload.
//!
//! The upstream format is undocumented and drifts between result types, so
//! every field is optional, scalar fields accept strings, numbers or
//! booleans, and unknown fields are ignored.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LabResponse {
    pub svaroversigt: Option<ResultOverview>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultOverview {
    #[serde(rename = "laboratorieresultater", deserialize_with = "list")]
    pub results: Vec<LabResult>,
    #[serde(rename = "rekvisitioner", deserialize_with = "list")]
    pub requisitions: Vec<Requisition>,
}

/// One laboratory result record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LabResult {
    #[serde(rename = "rekvisitionsId", deserialize_with = "text")]
    pub requisition_id: Option<String>,
    #[serde(rename = "proevenummerLaboratorie", deserialize_with = "text")]
    pub specimen_number: Option<String>,
    #[serde(rename = "resultatStatuskode", deserialize_with = "text")]
    pub status_code: Option<String>,
    #[serde(rename = "resultatStatus", deserialize_with = "text")]
    pub status_text: Option<String>,
    #[serde(rename = "resultattype", deserialize_with = "text")]
    pub result_type: Option<String>,
    #[serde(rename = "vaerditype", deserialize_with = "text")]
    pub value_type: Option<String>,
    #[serde(rename = "analysetypeId", deserialize_with = "text")]
    pub analysis_type_id: Option<String>,
    #[serde(rename = "vaerdi", deserialize_with = "text")]
    pub value: Option<String>,
    #[serde(rename = "referenceIntervalTekst", deserialize_with = "text")]
    pub reference_range: Option<String>,
    #[serde(rename = "resultatdato", deserialize_with = "text")]
    pub result_date: Option<String>,
    #[serde(rename = "analysevejledningLink", deserialize_with = "text")]
    pub guidance_link: Option<String>,
    #[serde(rename = "materialeHtml", deserialize_with = "text")]
    pub material_html: Option<String>,
    #[serde(rename = "diagnoseHtml", deserialize_with = "text")]
    pub diagnosis_html: Option<String>,
    #[serde(rename = "konklusionHtml", deserialize_with = "text")]
    pub conclusion_html: Option<String>,
    #[serde(rename = "mikroskopiHtml", deserialize_with = "text")]
    pub microscopy_html: Option<String>,
    #[serde(rename = "makroskopiHtml", deserialize_with = "text")]
    pub macroscopy_html: Option<String>,
    #[serde(rename = "kliniskeInformationerHtml", deserialize_with = "text")]
    pub clinical_information_html: Option<String>,
    #[serde(rename = "undersoegelser", deserialize_with = "list")]
    pub examinations: Vec<Examination>,
}

/// An examination ("undersøgelse") nested under a result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Examination {
    #[serde(rename = "undersoegelsesNavn", deserialize_with = "text")]
    pub name: Option<String>,
    #[serde(rename = "analyseKode", deserialize_with = "text")]
    pub analysis_code: Option<String>,
    #[serde(rename = "eksaminator", deserialize_with = "text")]
    pub examiner: Option<String>,
    #[serde(rename = "quantitativeFindings", alias = "QuantitativeFindings")]
    pub quantitative_findings: Option<QuantitativeFindings>,
}

/// Header row plus data rows, positional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuantitativeFindings {
    #[serde(alias = "Data", deserialize_with = "rows")]
    pub data: Vec<Vec<Value>>,
}

/// The requisition a result was ordered under.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Requisition {
    #[serde(deserialize_with = "text")]
    pub id: Option<String>,
    #[serde(rename = "proevetagningstidspunkt", deserialize_with = "text")]
    pub specimen_collected: Option<String>,
    #[serde(rename = "rekvirentsOrganisation", deserialize_with = "text")]
    pub requesting_organisation: Option<String>,
    #[serde(rename = "patientCpr", deserialize_with = "text")]
    pub patient_cpr: Option<String>,
    #[serde(rename = "patientNavn", deserialize_with = "text")]
    pub patient_name: Option<String>,
}

impl LabResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }
}

impl QuantitativeFindings {
    /// Render one cell as trimmed text; `None` for null, missing or blank.
    pub fn cell(row: &[Value], column: usize) -> Option<String> {
        let text = match row.get(column)? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Scalar as text: strings verbatim, numbers and booleans rendered.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// `null` reads as an empty list.
fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Rows that are not arrays are dropped rather than failing the payload.
fn rows<'de, D>(deserializer: D) -> Result<Vec<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(rows) => rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Array(cells) => Some(cells),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_overview() {
        let payload = json!({
            "svaroversigt": {
                "laboratorieresultater": [{
                    "rekvisitionsId": "REK-1",
                    "proevenummerLaboratorie": 4711,
                    "resultatStatuskode": "SvarEndeligt",
                    "undersoegelser": [{
                        "undersoegelsesNavn": "P-Kalium",
                        "QuantitativeFindings": {
                            "Data": [["h0", "h1"], ["v0", 4.2, null]]
                        }
                    }],
                    "someNewField": {"ignored": true}
                }],
                "rekvisitioner": [{"id": "REK-1", "patientNavn": "Test Testesen"}]
            }
        });

        let response: LabResponse = serde_json::from_value(payload).unwrap();
        let overview = response.svaroversigt.unwrap();
        let result = &overview.results[0];
        assert_eq!(result.requisition_id.as_deref(), Some("REK-1"));
        assert_eq!(result.specimen_number.as_deref(), Some("4711"));
        let findings = result.examinations[0].quantitative_findings.as_ref().unwrap();
        assert_eq!(findings.data.len(), 2);
        assert_eq!(QuantitativeFindings::cell(&findings.data[1], 1).as_deref(), Some("4.2"));
        assert_eq!(QuantitativeFindings::cell(&findings.data[1], 2), None);
        assert_eq!(QuantitativeFindings::cell(&findings.data[1], 7), None);
        assert_eq!(overview.requisitions[0].patient_name.as_deref(), Some("Test Testesen"));
    }

    #[test]
    fn test_nulls_and_absent_fields() {
        let payload = json!({
            "svaroversigt": {
                "laboratorieresultater": [{"undersoegelser": null, "vaerdi": null}],
                "rekvisitioner": null
            }
        });
        let response: LabResponse = serde_json::from_value(payload).unwrap();
        let overview = response.svaroversigt.unwrap();
        assert!(overview.results[0].examinations.is_empty());
        assert!(overview.results[0].value.is_none());
        assert!(overview.requisitions.is_empty());
    }

    #[test]
    fn test_empty_body_is_empty_response() {
        let response = LabResponse::from_slice(b"  ").unwrap();
        assert!(response.svaroversigt.is_none());
        assert!(LabResponse::from_slice(b"<html>").is_err());
    }
}
