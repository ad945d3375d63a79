//! Agent registry for valorix
//!
//! Maps agent identifiers to their executable implementation and declared
//! capability metadata. Registration happens once at startup; afterwards the
//! registry is shared read-only (typically behind an `Arc`) across every
//! concurrent evaluation run.

pub mod registry;

pub use registry::{AgentRegistry, RegisteredAgent};
