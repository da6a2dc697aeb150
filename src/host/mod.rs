pub mod bridge;
pub mod ext;
pub mod probe;

pub use bridge::HostBridge;
pub use ext::{TagChip, TagsExtension};
pub use probe::{ProbeOutcome, ReadinessProbe};
