pub mod config;
pub mod gameplay;
pub mod states;
