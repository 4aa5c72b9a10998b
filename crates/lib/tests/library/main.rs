//! End-to-end scenarios for homelab-lib against a simulated host.

mod common;
mod pipeline_tests;
mod status_tests;
