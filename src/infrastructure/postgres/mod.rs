//! PostgreSQL: connection URIs and the COPY streamer.

pub mod connection_uri;
pub mod copy_streamer;
