//! Integration Tests Module
//!
//! End-to-end tests for CI triage. Every evidence source is an in-process
//! fake, so no network, CI server or git binary is needed.

// Fakes for the build server, environment and repository fetcher
mod support;

// Full analyses: classification scenarios, errors, serialization
mod analysis_test;

// Investigation concurrency/cancellation and citation validation
mod evidence_test;
