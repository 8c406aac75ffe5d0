mod types;
pub mod merge;
pub mod quality;

pub use merge::merge_hosts;
pub use quality::score;
pub use types::{DiscoveryMethod, HostStatus, HostUpdate, Observation};
pub(crate) use types::has_value;
