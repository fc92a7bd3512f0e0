//! Ports: the seams between the pipeline and its database and storage adapters.

pub mod blob_publisher;
pub mod export_streamer;
