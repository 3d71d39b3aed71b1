pub mod bundle;
pub mod error;
pub mod html;
pub mod mapper;
pub mod observation;
pub mod operation_outcome;
pub mod resource;
pub mod search_query;
pub mod upstream;

pub use bundle::{Bundle, BundleEntry, BundleType};
pub use error::{DhroxyError, Result};
pub use mapper::LabMapper;
pub use mapper::tabular::ColumnMap;
pub use observation::{Observation, ObservationStatus, ObservationValue};
pub use operation_outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
pub use resource::Resource;
pub use search_query::{DateBound, LabArea, RawHeaders, SearchQuery, parse_query_pairs};
pub use upstream::{LabResponse, LabResult, Requisition};
