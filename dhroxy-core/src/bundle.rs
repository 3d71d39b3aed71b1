use serde::Serialize;
use serde_json::Value;

/// FHIR Bundle as produced by this server (`searchset` or `transaction-response`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "resourceType", rename = "Bundle")]
pub struct Bundle {
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Searchset,
    TransactionResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<EntrySearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<EntryResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySearch {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    /// HTTP status line, e.g. "200 OK"
    pub status: String,
}

impl Bundle {
    /// Searchset with a self link; `total` follows the entry count.
    pub fn searchset(self_url: impl Into<String>, resources: Vec<Value>) -> Self {
        let entry: Vec<BundleEntry> = resources
            .into_iter()
            .map(|resource| BundleEntry {
                full_url: Some(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
                resource,
                search: Some(EntrySearch {
                    mode: "match".to_string(),
                }),
                response: None,
            })
            .collect();

        Self {
            bundle_type: BundleType::Searchset,
            total: Some(entry.len()),
            link: vec![BundleLink {
                relation: "self".to_string(),
                url: self_url.into(),
            }],
            entry,
        }
    }

    /// Transaction response from `(resource, status line)` pairs, order kept.
    pub fn transaction_response(results: impl IntoIterator<Item = (Value, String)>) -> Self {
        Self {
            bundle_type: BundleType::TransactionResponse,
            total: None,
            link: Vec::new(),
            entry: results
                .into_iter()
                .map(|(resource, status)| BundleEntry {
                    full_url: None,
                    resource,
                    search: None,
                    response: Some(EntryResponse { status }),
                })
                .collect(),
        }
    }
}
