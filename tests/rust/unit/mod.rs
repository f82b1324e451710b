//! Unit tests - loading mapping and query documents
//!
//! These run against the YAML fixtures under tests/fixtures without compiling
//! any plan.

mod mapping_document_tests;
mod query_document_tests;
