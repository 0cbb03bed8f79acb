pub mod registry;
pub mod types;

pub use registry::SessionRegistry;
pub use types::{SessionConfig, SessionData, SessionRecord};
