pub mod record_service;

pub use record_service::{resolve_record_values, RecordService};
