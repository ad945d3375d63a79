//! Core abstractions for valorix
//!
//! This crate defines the contract every analysis agent satisfies, the
//! descriptor metadata the registry keeps about it, the opaque parameter
//! payload passed between pipeline steps, and the shared error types.

pub mod agent;
pub mod descriptor;
pub mod error;
pub mod params;

pub use agent::{Agent, AgentError, AgentErrorKind, AgentResult};
pub use descriptor::AgentDescriptor;
pub use error::{Error, Result};
pub use params::Params;
