//! Deterministic simulation harness for the provisioning link.
//!
//! An in-memory, lossy point-to-point link pair ([`sim_link::SimLink`]),
//! a virtual-clock environment ([`sim_env::SimEnv`]), and a pumped device
//! endpoint ([`sim_device::SimDevice`]) that together run full
//! operator-to-device conversations under tokio's paused time. The
//! end-to-end scenario tests live in `tests/`.

pub mod sim_device;
pub mod sim_env;
pub mod sim_link;

pub use sim_device::{SharedStore, SimDevice};
pub use sim_env::SimEnv;
pub use sim_link::{DropHandle, SimLink};
