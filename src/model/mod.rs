pub mod attendance;
pub mod consistency;
pub mod coverage;
pub mod geofence;
pub mod punch;
pub mod role;
pub mod validation;
