mod bulk;
mod document;
mod embedding;
mod field_map;
mod filters;
mod search;

pub use bulk::{
    BulkItemFailure, BulkItemOutcome, BulkOperation, BulkResponse, BulkSummary, WriteIntent,
};
pub use document::{Document, DocumentInput, DocumentStats, Label, LabelInput, RecordInput};
pub use embedding::Embedding;
pub use field_map::{FieldMap, TAGS_FIELD};
pub use filters::Filters;
pub use search::{ScrollPage, SearchHit};
