//! End-to-end compiler tests over the person mapping fixture.


mod join_tests;
mod type_dispatch_tests;
