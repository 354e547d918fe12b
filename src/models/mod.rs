// EAV schema rows and record views

pub mod eav_models;

pub use eav_models::{Attribute, EntityType, NewAttribute, RecordRow, StoredValue};
