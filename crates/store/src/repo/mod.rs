pub mod settings;
pub mod usage;
