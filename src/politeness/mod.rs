//! Politeness enforcement
//!
//! A single [`PolitenessGate`] stands between fetch tasks and the network. It
//! applies robots.txt (fetched once per host per run) and a minimum spacing
//! between requests to the same host.

mod gate;
mod host;

pub use gate::{Admission, Clearance, GateSettings, PolitenessGate};
pub use host::HostState;
