pub mod adapter;
pub mod config;
pub mod device;
pub mod error;
pub mod fixtures;
pub mod lifecycle;
pub mod report;
pub mod testbed;
pub mod vlan;

pub use adapter::parse_show_vlan;
pub use lifecycle::{RunPlan, run};
pub use vlan::{ExpectedVlans, MalformedPolicy, MissingVlans, VlanId, VlanTable, verify, verify_raw};
