//! Portable query trees translated to dialect SQL, with compiled queries
//! cached per call site and executed against PostgreSQL or an in-memory
//! interpreter.
pub mod ast;
pub mod compiled;
pub mod config;
pub mod db;
pub mod error;
pub mod language;
pub mod memory;
