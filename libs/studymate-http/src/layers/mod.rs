//! Tower layers used by the client stack
//!
//! - [`UserAgentLayer`] - Adds a User-Agent header unless the caller set one

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
