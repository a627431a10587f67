// Control plane API: wire types and the HTTP client used to fetch
// schedules, push status reports, and send heartbeats. The monitor loop
// only sees the `ControlPlaneClient` trait so tests can substitute a
// recording fake.

pub mod client;
pub mod models;

pub use client::{ControlPlaneClient, HttpControlPlane};
pub use models::{ApiResponse, DeviceRegistration, DeviceStatusReport, Schedule};
