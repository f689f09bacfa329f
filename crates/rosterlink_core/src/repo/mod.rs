//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage capability (`EntityStore`) the engine is written
//!   against.
//! - Isolate SQLite and JSON path details from reconciliation and services.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `VersionConflict`)
//!   in addition to DB transport errors.

pub mod document_repo;
mod id_allocator;
pub mod query;
