pub mod actor;
pub mod audit;
pub mod auth;
pub mod decision;
pub mod error;
pub mod settings;
