pub mod agent;
pub mod capabilities;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod providers;
pub mod settings;
