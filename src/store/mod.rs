pub mod agents;
pub mod favorites;
pub mod session;

pub use agents::AgentCache;
pub use favorites::Favorites;
pub use session::SessionStore;
