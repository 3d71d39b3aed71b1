//! Ordered fallback chains. Each rule proposes a candidate; the first
//! non-blank candidate wins.

use super::tabular::TabularFindings;
use crate::html::clean_text;
use crate::upstream::{Examination, LabResult};

/// Everything a rule may look at for one record.
pub struct MappingInput<'a> {
    pub result: &'a LabResult,
    pub examination: Option<&'a Examination>,
    pub tabular: Option<&'a TabularFindings>,
}

pub type Rule = fn(&MappingInput<'_>) -> Option<String>;

/// Display name, most complete source first.
pub const DISPLAY_NAME_RULES: &[(&str, Rule)] = &[
    ("examination_name", examination_name),
    ("tabular_text", tabular_text),
    ("result_type", result_type),
    ("value_type", value_type),
    ("analysis_type_id", analysis_type_id),
];

/// Analysis code.
pub const CODE_RULES: &[(&str, Rule)] = &[
    ("tabular_code", tabular_code),
    ("examination_code", examination_code),
    ("analysis_type_id", analysis_type_id),
];

/// Narrative text used as value when the table has none.
pub const NARRATIVE_VALUE_RULES: &[(&str, Rule)] = &[
    ("conclusion", conclusion),
    ("diagnosis", diagnosis),
    ("microscopy", microscopy),
    ("macroscopy", macroscopy),
    ("raw_value", raw_value),
];

/// Run a chain, returning the winning rule's name and its value.
pub fn first_match(rules: &[(&'static str, Rule)], input: &MappingInput<'_>) -> Option<(&'static str, String)> {
    rules.iter().find_map(|(name, rule)| {
        rule(input)
            .filter(|candidate| !candidate.trim().is_empty())
            .map(|candidate| (*name, candidate))
    })
}

fn examination_name(input: &MappingInput<'_>) -> Option<String> {
    input.examination?.name.clone()
}

fn tabular_text(input: &MappingInput<'_>) -> Option<String> {
    input.tabular?.display_name.clone()
}

/// `Xrpt…` is a report placeholder, not a name.
fn result_type(input: &MappingInput<'_>) -> Option<String> {
    let value = input.result.result_type.as_deref()?;
    let is_placeholder = value
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xrpt"));
    (!is_placeholder).then(|| value.to_string())
}

fn value_type(input: &MappingInput<'_>) -> Option<String> {
    let value = input.result.value_type.as_deref()?;
    (value != "Tekst" && value != "Numerisk").then(|| value.to_string())
}

fn analysis_type_id(input: &MappingInput<'_>) -> Option<String> {
    input.result.analysis_type_id.clone()
}

fn conclusion(input: &MappingInput<'_>) -> Option<String> {
    clean_text(input.result.conclusion_html.as_deref())
}

fn diagnosis(input: &MappingInput<'_>) -> Option<String> {
    clean_text(input.result.diagnosis_html.as_deref())
}

fn microscopy(input: &MappingInput<'_>) -> Option<String> {
    clean_text(input.result.microscopy_html.as_deref())
}

fn macroscopy(input: &MappingInput<'_>) -> Option<String> {
    clean_text(input.result.macroscopy_html.as_deref())
}

fn raw_value(input: &MappingInput<'_>) -> Option<String> {
    input.result.value.clone()
}

fn tabular_code(input: &MappingInput<'_>) -> Option<String> {
    input.tabular?.code.clone()
}

fn examination_code(input: &MappingInput<'_>) -> Option<String> {
    input.examination?.analysis_code.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> LabResult {
        LabResult {
            result_type: Some("Kvantitativ".to_string()),
            value_type: Some("Blodtype".to_string()),
            analysis_type_id: Some("iupac_NPU01960".to_string()),
            ..Default::default()
        }
    }

    fn examination(name: &str) -> Examination {
        Examination {
            name: Some(name.to_string()),
            analysis_code: Some("EX-1".to_string()),
            ..Default::default()
        }
    }

    fn tabular(text: &str) -> TabularFindings {
        TabularFindings {
            display_name: Some(text.to_string()),
            code: Some("NPU01960".to_string()),
            value: None,
        }
    }

    #[test]
    fn test_examination_name_beats_tabular_text() {
        let (result, exam, table) = (result(), examination("SARS-CoV-2 (RNA)"), tabular("SARS-CoV-2"));
        let input = MappingInput {
            result: &result,
            examination: Some(&exam),
            tabular: Some(&table),
        };
        assert_eq!(
            first_match(DISPLAY_NAME_RULES, &input),
            Some(("examination_name", "SARS-CoV-2 (RNA)".to_string()))
        );
    }

    #[test]
    fn test_tabular_text_beats_type_fields() {
        let (result, exam, table) = (result(), examination("   "), tabular("B-Erythrocytter"));
        let input = MappingInput {
            result: &result,
            examination: Some(&exam),
            tabular: Some(&table),
        };
        assert_eq!(
            first_match(DISPLAY_NAME_RULES, &input).map(|(n, _)| n),
            Some("tabular_text")
        );
    }

    #[test]
    fn test_result_type_placeholder_rejected() {
        let mut result = result();
        result.result_type = Some("XRPT_Mikro".to_string());
        let input = MappingInput {
            result: &result,
            examination: None,
            tabular: None,
        };
        assert_eq!(
            first_match(DISPLAY_NAME_RULES, &input),
            Some(("value_type", "Blodtype".to_string()))
        );
    }

    #[test]
    fn test_generic_value_types_rejected() {
        for generic in ["Tekst", "Numerisk"] {
            let result = LabResult {
                value_type: Some(generic.to_string()),
                analysis_type_id: Some("iupac_DNK35312".to_string()),
                ..Default::default()
            };
            let input = MappingInput {
                result: &result,
                examination: None,
                tabular: None,
            };
            assert_eq!(
                first_match(DISPLAY_NAME_RULES, &input),
                Some(("analysis_type_id", "iupac_DNK35312".to_string()))
            );
        }
    }

    #[test]
    fn test_code_chain() {
        let (result, exam, table) = (result(), examination("x"), tabular("x"));
        let with_table = MappingInput {
            result: &result,
            examination: Some(&exam),
            tabular: Some(&table),
        };
        assert_eq!(first_match(CODE_RULES, &with_table).unwrap().1, "NPU01960");

        let without_table = MappingInput {
            result: &result,
            examination: Some(&exam),
            tabular: None,
        };
        assert_eq!(first_match(CODE_RULES, &without_table).unwrap().1, "EX-1");

        let bare = MappingInput {
            result: &result,
            examination: None,
            tabular: None,
        };
        assert_eq!(first_match(CODE_RULES, &bare).unwrap().1, "iupac_NPU01960");
    }

    #[test]
    fn test_narrative_value_order() {
        let result = LabResult {
            diagnosis_html: Some("<p>Diagnose</p>".to_string()),
            conclusion_html: Some("<p> </p>".to_string()),
            value: Some("raw".to_string()),
            ..Default::default()
        };
        let input = MappingInput {
            result: &result,
            examination: None,
            tabular: None,
        };
        assert_eq!(
            first_match(NARRATIVE_VALUE_RULES, &input),
            Some(("diagnosis", "Diagnose".to_string()))
        );
    }

    #[test]
    fn test_empty_record_matches_nothing() {
        let result = LabResult::default();
        let input = MappingInput {
            result: &result,
            examination: None,
            tabular: None,
        };
        assert_eq!(first_match(DISPLAY_NAME_RULES, &input), None);
        assert_eq!(first_match(NARRATIVE_VALUE_RULES, &input), None);
    }
}
