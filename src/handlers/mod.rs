pub mod apps;
pub mod public;
