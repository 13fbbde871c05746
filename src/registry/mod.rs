//! # Processor Registry
//!
//! Maps filing type names to the processor that applies them.
//!
//! ## Overview
//!
//! The registry is built once at startup from [`crate::processors::all_processors`]
//! and the `processors.disabled` feature flags, then shared read-only by every
//! worker. Resolution distinguishes a name that is not a filing type at all
//! from a known type whose processor has been switched off.

pub mod processor_registry;

pub use processor_registry::ProcessorRegistry;
