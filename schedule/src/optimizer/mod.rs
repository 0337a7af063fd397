//! Empirical kernel layout search.
//!
//! - [`types`] - [`Intervention`] and the upcast amounts
//! - [`interventions`] - Candidate enumeration and application
//! - [`search`] - Round-based greedy search with timing on the device
//! - [`config`] - [`SearchConfig`]
//! - [`check`] - Correctness checks run on the winner

pub mod check;
pub mod config;
pub mod interventions;
pub mod search;
pub mod types;

pub use check::{KernelCheck, NoCheck, ReferenceCheck};
pub use config::SearchConfig;
pub use interventions::{apply_intervention, get_interventions};
pub use search::{SearchResult, replay, run_and_time, search, search_one};
pub use types::{Intervention, UPCAST_AMOUNTS};
