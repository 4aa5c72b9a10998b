//! Shared utilities.
//!
//! Currently only the scripted host used by unit and integration tests.

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
