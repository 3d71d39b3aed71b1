//! Translation of FHIR search parameters into labsvar query terms.
//!
//! Nothing in here fails: values that cannot be understood are dropped and
//! the search simply runs without that filter, which is what upstream does
//! with loose filters as well.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Request headers keyed by lower-cased name, values in arrival order.
pub type RawHeaders = BTreeMap<String, Vec<String>>;

const START_OF_DAY: &str = "T00:00:00";
const END_OF_DAY: &str = "T23:59:59";

/// One resolved end of a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateBound {
    /// Calendar date, widened to a full day when sent upstream
    Date(NaiveDate),
    /// Value that already carried a time component; sent verbatim
    DateTime(String),
}

impl DateBound {
    /// Parse `YYYY-MM-DD` or a date-time with or without offset.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.contains('T') {
            let valid = DateTime::parse_from_rfc3339(raw).is_ok()
                || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok();
            return valid.then(|| DateBound::DateTime(raw.to_string()));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(DateBound::Date)
    }

    /// Instant at the start of this bound
    pub fn lower_instant(&self) -> String {
        match self {
            DateBound::Date(date) => format!("{}{}", date.format("%Y-%m-%d"), START_OF_DAY),
            DateBound::DateTime(raw) => raw.clone(),
        }
    }

    /// Instant at the end of this bound
    pub fn upper_instant(&self) -> String {
        match self {
            DateBound::Date(date) => format!("{}{}", date.format("%Y-%m-%d"), END_OF_DAY),
            DateBound::DateTime(raw) => raw.clone(),
        }
    }
}

/// Result domains ("omraade") understood by the labsvar API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabArea {
    Microbiology,
    Pathology,
    ClinicalBiochemistry,
    #[default]
    All,
}

/// Substring → area. Checked in order, first hit wins.
const AREA_TABLE: &[(&str, LabArea)] = &[
    ("mikro", LabArea::Microbiology),
    ("micro", LabArea::Microbiology),
    ("patolog", LabArea::Pathology),
    ("patholog", LabArea::Pathology),
    ("klinisk", LabArea::ClinicalBiochemistry),
    ("biokemi", LabArea::ClinicalBiochemistry),
    ("biochem", LabArea::ClinicalBiochemistry),
];

impl LabArea {
    /// Upstream domain code
    pub fn code(&self) -> &'static str {
        match self {
            LabArea::Microbiology => "Mikrobiologi",
            LabArea::Pathology => "Patologi",
            LabArea::ClinicalBiochemistry => "KliniskBiokemi",
            LabArea::All => "Alle",
        }
    }

    /// Map a category token onto an area by case-insensitive substring match.
    /// A `system|code` token is matched on its code.
    pub fn from_category(category: Option<&str>) -> Self {
        let Some(category) = category else {
            return LabArea::All;
        };
        let code = category.rsplit('|').next().unwrap_or(category);
        let normalized = code.trim().to_lowercase();
        if normalized.is_empty() {
            return LabArea::All;
        }
        AREA_TABLE
            .iter()
            .find(|(needle, _)| normalized.contains(needle))
            .map(|(_, area)| *area)
            .unwrap_or_default()
    }
}

/// A decoded Observation search, ready to be sent upstream.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub date_from: Option<DateBound>,
    pub date_to: Option<DateBound>,
    pub category: Option<String>,
    pub headers: RawHeaders,
}

impl SearchQuery {
    /// Translate raw `date` values and a category token, using today's local date.
    pub fn translate<S: AsRef<str>>(raw_dates: &[S], raw_category: Option<&str>) -> Self {
        Self::translate_on(raw_dates, raw_category, Local::now().date_naive())
    }

    /// Same as [`SearchQuery::translate`] with an explicit "today".
    pub fn translate_on<S: AsRef<str>>(
        raw_dates: &[S],
        raw_category: Option<&str>,
        today: NaiveDate,
    ) -> Self {
        let (date_from, mut date_to) = decode_date_range(raw_dates);
        if date_from.is_some() && date_to.is_none() {
            // labsvar rejects a range with only one end
            date_to = Some(DateBound::Date(today));
        }

        let query = Self {
            date_from,
            date_to,
            category: raw_category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            headers: RawHeaders::new(),
        };

        tracing::debug!(
            from = ?query.date_from,
            to = ?query.date_to,
            area = query.area().code(),
            "Translated search parameters"
        );
        query
    }

    /// Upstream area the category token routes to.
    pub fn area(&self) -> LabArea {
        LabArea::from_category(self.category.as_deref())
    }

    /// Attach the caller's headers so they can be forwarded upstream.
    pub fn with_headers(mut self, headers: RawHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn lower_instant(&self) -> Option<String> {
        self.date_from.as_ref().map(DateBound::lower_instant)
    }

    pub fn upper_instant(&self) -> Option<String> {
        self.date_to.as_ref().map(DateBound::upper_instant)
    }

    /// Query terms for the labsvar endpoint: `fra`, `til`, `omraade`.
    pub fn upstream_terms(&self) -> Vec<(&'static str, String)> {
        let mut terms = Vec::with_capacity(3);
        if let Some(fra) = self.lower_instant() {
            terms.push(("fra", fra));
        }
        if let Some(til) = self.upper_instant() {
            terms.push(("til", til));
        }
        terms.push(("omraade", self.area().code().to_string()));
        terms
    }
}

/// Walk the comparison-prefixed values and resolve (lower, upper).
fn decode_date_range<S: AsRef<str>>(raw_dates: &[S]) -> (Option<DateBound>, Option<DateBound>) {
    let mut from: Option<DateBound> = None;
    let mut to: Option<DateBound> = None;

    for raw in raw_dates {
        let raw = raw.as_ref().trim();
        let (prefix, value) = split_prefix(raw);
        let Some(bound) = DateBound::parse(value) else {
            tracing::debug!(value = raw, "Ignoring unparseable date parameter");
            continue;
        };
        match prefix {
            Some("ge" | "gt") => from = Some(bound),
            Some("le" | "lt") => to = Some(bound),
            Some("eq") => {
                from = Some(bound.clone());
                to = Some(bound);
            }
            _ if from.is_none() => from = Some(bound),
            _ if to.is_none() => to = Some(bound),
            _ => {}
        }
    }
    (from, to)
}

fn split_prefix(value: &str) -> (Option<&str>, &str) {
    for prefix in ["ge", "gt", "le", "lt", "eq"] {
        if let Some(rest) = value.strip_prefix(prefix) {
            return (Some(prefix), rest);
        }
    }
    (None, value)
}

/// Decode a raw query string into ordered `(name, value)` pairs.
/// Repeated names are kept; pairs that fail to decode are skipped.
pub fn parse_query_pairs(query_string: &str) -> Vec<(String, String)> {
    query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?;
            let value = urlencoding::decode(value).ok()?;
            (!key.is_empty()).then(|| (key.into_owned(), value.into_owned()))
        })
        .collect()
}
