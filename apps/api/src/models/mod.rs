pub mod analysis;
pub mod artifact;
pub mod credits;
