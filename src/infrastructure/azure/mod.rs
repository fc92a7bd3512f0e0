//! Azure Blob Storage: client construction and uploads.

pub mod blob_publisher;
pub mod store_builder;
