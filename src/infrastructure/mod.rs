//! Adapters implementing the ports against real infrastructure.

pub mod azure;
pub mod postgres;
