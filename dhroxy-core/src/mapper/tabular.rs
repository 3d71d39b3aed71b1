//! Positional extraction from `QuantitativeFindings`.
//!
//! Row 0 is a header row, row 1 the data row; only the first data row is
//! read. Which column means what is not documented upstream, so the
//! positions live in a versioned [`ColumnMap`] that configuration can
//! override when the format drifts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::upstream::QuantitativeFindings;

/// Result tokens that are reported as text even though they sit in the value column.
const TEXT_RESULTS: &[&str] = &["ikke påvist", "påvist", "negativ", "positiv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub version: u16,
    pub text: usize,
    pub code: usize,
    pub value: usize,
    pub unit: usize,
}

impl ColumnMap {
    /// Layout observed in labsvar payloads since 2023.
    pub const V1: Self = Self {
        version: 1,
        text: 4,
        code: 1,
        value: 9,
        unit: 10,
    };
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self::V1
    }
}

/// Fields read out of the data row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularFindings {
    pub display_name: Option<String>,
    pub code: Option<String>,
    pub value: Option<TabularValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TabularValue {
    Numeric { value: Decimal, unit: Option<String> },
    Text(String),
}

/// Read the first data row. `None` when there is no usable data row.
pub fn extract(
    findings: Option<&QuantitativeFindings>,
    columns: &ColumnMap,
) -> Option<TabularFindings> {
    let data = &findings?.data;
    if data.len() < 2 {
        return None;
    }
    let (header, row) = (&data[0], &data[1]);
    tracing::debug!(
        layout = columns.version,
        header_columns = header.len(),
        row_columns = row.len(),
        "Reading quantitative findings"
    );
    if row.is_empty() {
        return None;
    }

    let display_name = QuantitativeFindings::cell(row, columns.text);
    let code = QuantitativeFindings::cell(row, columns.code);
    let unit = QuantitativeFindings::cell(row, columns.unit);
    let value = QuantitativeFindings::cell(row, columns.value).map(|raw| resolve_value(raw, unit));

    tracing::debug!(
        display_name = display_name.as_deref(),
        code = code.as_deref(),
        value = ?value,
        "Extracted tabular fields"
    );

    Some(TabularFindings {
        display_name,
        code,
        value,
    })
}

/// Known text tokens stay text, otherwise try a decimal, otherwise text.
///
/// The decimal keeps the scale it was written with: `4.20` stays `4.20`.
pub fn resolve_value(raw: String, unit: Option<String>) -> TabularValue {
    if is_text_result(&raw) {
        return TabularValue::Text(raw);
    }
    match Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)) {
        Ok(value) => TabularValue::Numeric { value, unit },
        Err(_) => TabularValue::Text(raw),
    }
}

fn is_text_result(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    TEXT_RESULTS.contains(&lowered.as_str())
}
