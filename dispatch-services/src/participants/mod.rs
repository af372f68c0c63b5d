pub mod fleet;
pub mod routing;

pub use fleet::FleetParticipant;
pub use routing::RoutingParticipant;
