pub mod confirmations;
pub mod health;
pub mod preview;
pub mod requests;
pub mod settings;
