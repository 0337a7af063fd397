//! Property-based tests for shape tracking.
//!
//! Uses proptest to check trackers against a dense reference model.
