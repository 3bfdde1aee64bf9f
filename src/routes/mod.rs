//! HTTP route modules.
//!
//! - `repairs`: the job-records API over the repair job engine

pub mod repairs;
