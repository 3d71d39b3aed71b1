//! labsvar result → FHIR Observation.

pub mod rules;
pub mod tabular;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::bundle::Bundle;
use crate::error::{DhroxyError, Result};
use crate::html::clean_text;
use crate::observation::{
    Annotation, CodeableConcept, Coding, Identifier, Observation, ObservationStatus,
    ObservationValue, Quantity, Reference, ReferenceRange,
};
use crate::upstream::{LabResponse, LabResult, Requisition};
use rules::{CODE_RULES, DISPLAY_NAME_RULES, MappingInput, NARRATIVE_VALUE_RULES, first_match};
use tabular::{ColumnMap, TabularValue};

pub const REQUISITION_SYSTEM: &str = "https://www.sundhed.dk/labsvar/rekvisition";
pub const SPECIMEN_SYSTEM: &str = "https://www.sundhed.dk/labsvar/proevenummer";
pub const CODE_SYSTEM: &str = "https://www.sundhed.dk/codes/labsvar";
pub const CPR_SYSTEM: &str = "urn:dk:cpr";
/// System for subject identifiers derived from the observation id. These
/// are pseudonyms: stable per observation, never a real patient match.
pub const PSEUDONYM_SYSTEM: &str = "urn:dhroxy:pseudonym";

const MAX_ID_LEN: usize = 64;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("valid slug pattern"));

/// Narrative fields attached as notes, with their label, in note order.
fn narrative_fields(record: &LabResult) -> [(&'static str, Option<&str>); 6] {
    [
        ("Materiale", record.material_html.as_deref()),
        ("Diagnose", record.diagnosis_html.as_deref()),
        ("Konklusion", record.conclusion_html.as_deref()),
        ("Mikroskopi", record.microscopy_html.as_deref()),
        ("Makroskopi", record.macroscopy_html.as_deref()),
        ("Kliniske oplysninger", record.clinical_information_html.as_deref()),
    ]
}

/// Maps labsvar records. Holds only the tabular column layout.
#[derive(Debug, Clone, Default)]
pub struct LabMapper {
    columns: ColumnMap,
}

impl LabMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(columns: ColumnMap) -> Self {
        Self { columns }
    }

    /// Map one result. `related` is the requisition the result was ordered
    /// under, when upstream listed it.
    ///
    /// Fails only when a timestamp cannot be parsed.
    pub fn map(&self, record: &LabResult, related: Option<&Requisition>) -> Result<Observation> {
        let examination = record.examinations.first();
        let tabular = tabular::extract(
            examination.and_then(|e| e.quantitative_findings.as_ref()),
            &self.columns,
        );
        let input = MappingInput {
            result: record,
            examination,
            tabular: tabular.as_ref(),
        };

        let id = observation_id(record);

        let display_name = first_match(DISPLAY_NAME_RULES, &input).map(|(rule, name)| {
            tracing::debug!(id = %id, rule, name = %name, "Resolved display name");
            name
        });
        let code = first_match(CODE_RULES, &input).map(|(rule, code)| {
            tracing::debug!(id = %id, rule, code = %code, "Resolved analysis code");
            code
        });

        let value = match tabular.as_ref().and_then(|t| t.value.clone()) {
            Some(TabularValue::Numeric { value, unit }) => {
                Some(ObservationValue::Quantity(Quantity { value, unit }))
            }
            Some(TabularValue::Text(text)) => Some(ObservationValue::Text(text)),
            None => first_match(NARRATIVE_VALUE_RULES, &input).map(|(rule, text)| {
                tracing::debug!(id = %id, rule, "Value taken from narrative field");
                ObservationValue::Text(text)
            }),
        };

        let result_time = record
            .result_date
            .as_deref()
            .map(|raw| parse_timestamp("resultatdato", raw))
            .transpose()?;
        let collected_time = related
            .and_then(|r| r.specimen_collected.as_deref())
            .map(|raw| parse_timestamp("proevetagningstidspunkt", raw))
            .transpose()?;

        let effective_date_time = result_time
            .or(collected_time)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, false));
        let issued = result_time.map(|t| {
            t.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        });

        let performer = related
            .and_then(|r| non_blank(r.requesting_organisation.as_deref()))
            .or_else(|| examination.and_then(|e| non_blank(e.examiner.as_deref())))
            .map(Reference::display)
            .into_iter()
            .collect();

        let note = build_notes(record, code.as_deref());

        Ok(Observation {
            identifier: identifiers(record),
            status: map_status(record.status_code.as_deref(), record.status_text.as_deref()),
            category: vec![CodeableConcept::laboratory()],
            code: CodeableConcept {
                coding: code
                    .map(|code| Coding {
                        system: CODE_SYSTEM.to_string(),
                        code,
                        display: display_name.clone(),
                    })
                    .into_iter()
                    .collect(),
                text: display_name,
            },
            value,
            reference_range: non_blank(record.reference_range.as_deref())
                .map(|text| ReferenceRange { text: text.to_string() })
                .into_iter()
                .collect(),
            effective_date_time,
            issued,
            performer,
            subject: subject(&id, related),
            note,
            id,
        })
    }

    /// Map a whole payload into a searchset Bundle linked to `self_url`.
    pub fn to_search_bundle(&self, response: &LabResponse, self_url: &str) -> Result<Bundle> {
        let Some(overview) = response.svaroversigt.as_ref() else {
            return Ok(Bundle::searchset(self_url, Vec::new()));
        };

        let requisitions: HashMap<&str, &Requisition> = overview
            .requisitions
            .iter()
            .filter_map(|r| r.id.as_deref().map(|id| (id, r)))
            .collect();

        let resources = overview
            .results
            .iter()
            .map(|result| {
                let related = result
                    .requisition_id
                    .as_deref()
                    .and_then(|id| requisitions.get(id).copied());
                let observation = self.map(result, related)?;
                observation.to_value().map_err(DhroxyError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = resources.len(), "Mapped labsvar results");
        Ok(Bundle::searchset(self_url, resources))
    }
}

/// Upstream status code (preferred) or text → Observation status.
pub fn map_status(code: Option<&str>, text: Option<&str>) -> ObservationStatus {
    match code.or(text) {
        Some("SvarEndeligt" | "KompletSvar") => ObservationStatus::Final,
        Some("Foreloebigt") => ObservationStatus::Preliminary,
        Some("Annulleret") => ObservationStatus::Cancelled,
        _ => ObservationStatus::Unknown,
    }
}

/// Lowercase, collapse non-alphanumeric runs to `-`, trim, cap length.
pub fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let slug = NON_ALPHANUMERIC.replace_all(&lowered, "-");
    slug.trim_matches('-').chars().take(MAX_ID_LEN).collect()
}

fn observation_id(record: &LabResult) -> String {
    let stable = non_blank(record.requisition_id.as_deref())
        .or_else(|| non_blank(record.specimen_number.as_deref()))
        .map(slugify)
        .filter(|slug| !slug.is_empty());
    let key = stable.unwrap_or_else(|| {
        tracing::debug!("Record has no stable key, using a random id");
        slugify(&uuid::Uuid::new_v4().to_string())
    });
    format!("lab-{}", key)
}

fn identifiers(record: &LabResult) -> Vec<Identifier> {
    [
        (REQUISITION_SYSTEM, record.requisition_id.as_deref()),
        (SPECIMEN_SYSTEM, record.specimen_number.as_deref()),
    ]
    .into_iter()
    .filter_map(|(system, value)| {
        non_blank(value).map(|value| Identifier {
            system: system.to_string(),
            value: value.to_string(),
        })
    })
    .collect()
}

/// The patient's CPR when upstream supplied it, else a pseudonym hashed
/// from the observation id. The pseudonym identifies nobody.
fn subject(id: &str, related: Option<&Requisition>) -> Reference {
    let identifier = match related.and_then(|r| non_blank(r.patient_cpr.as_deref())) {
        Some(cpr) => Identifier {
            system: CPR_SYSTEM.to_string(),
            value: cpr.to_string(),
        },
        None => Identifier {
            system: PSEUDONYM_SYSTEM.to_string(),
            value: format!("{:x}", Sha256::digest(id.as_bytes())),
        },
    };
    Reference {
        identifier: Some(identifier),
        display: related.and_then(|r| non_blank(r.patient_name.as_deref()).map(str::to_string)),
    }
}

fn build_notes(record: &LabResult, code: Option<&str>) -> Vec<Annotation> {
    let mut notes = Vec::new();
    if let Some(link) = non_blank(record.guidance_link.as_deref()) {
        notes.push(format!("Analysevejledning: {}", link));
    }
    if let Some(code) = code {
        notes.push(format!("Analysekode: {}", code));
    }
    for (label, html) in narrative_fields(record) {
        if let Some(text) = clean_text(html) {
            notes.push(format!("{}: {}", label, text));
        }
    }
    notes.into_iter().map(|text| Annotation { text }).collect()
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|err| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z").map_err(|_| err))
        .map_err(|source| DhroxyError::InvalidTimestamp {
            field,
            value: raw.to_string(),
            source,
        })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
