pub mod attendance;
pub mod integrity;
