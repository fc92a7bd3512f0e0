//! Domain layer: entities, errors and the pure parts of the pipeline.

pub mod artifact_name;
pub mod entities;
pub mod errors;
pub mod export_statement;
pub mod request_validation;
