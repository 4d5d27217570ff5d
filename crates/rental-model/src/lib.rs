pub mod audit;
pub mod config;
pub mod error;
pub mod schema;

pub use audit::{AuditRecord, ImputationAudit};
pub use config::{BucketingMode, PipelineConfig};
pub use error::{RentalError, Result};
pub use schema::{ColumnRole, ColumnSpec, SchemaCheck, TableKind, TableSchema};
