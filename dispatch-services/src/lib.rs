pub mod apps;
pub mod coordinator;
pub mod fleet;
pub mod http;
pub mod participants;

pub use coordinator::Coordinator;
pub use fleet::FleetManager;
