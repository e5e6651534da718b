//! Broadcast hub: registry, coordinator, actor, and the named directory.

pub mod actor;
pub mod coordinator;
pub mod directory;
pub mod registry;

pub use actor::{HubEvent, HubHandle, HubStats};
pub use coordinator::{Coordinator, MessageReport, NORMAL_CLOSURE, RESET_SIGNAL};
pub use directory::HubDirectory;
pub use registry::ConnectionRegistry;
