pub mod connection_resolver;
pub mod local_artifact;
pub mod orchestrator;
pub mod pipeline;
pub mod runtime;
