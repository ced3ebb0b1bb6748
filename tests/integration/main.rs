//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against in-memory sockets. All tests run on the host (x86_64) with no
//! real network required.

mod engine_tests;
mod link_tests;
mod mock_net;
