//! # notegraph-lanes
//!
//! Runs one note through the local model and the remote providers side by
//! side. Each lane ends in its own [`notegraph_core::ExtractionLaneResult`];
//! a failing or unconfigured lane never affects its siblings.
//!
//! - [`policy`]: the bounded attempt table per lane kind
//! - [`orchestrator`]: concurrent lane execution and debug bundle assembly
//! - [`credentials`]: provider keys from the environment

pub mod credentials;
pub mod orchestrator;
pub mod policy;

pub use credentials::Credentials;
pub use orchestrator::{LaneOrchestrator, RemoteLane};
pub use policy::{run_policy, Attempt, AttemptFailure, PolicyOutcome, LOCAL_POLICY, REMOTE_POLICY};
