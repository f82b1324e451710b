//! Integration tests - compiling query documents against mapping documents
//!
//! These load the fixtures from disk the way the command line tool does and
//! check the full execution plan.

mod plan_compilation_tests;
