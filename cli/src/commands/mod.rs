pub mod confirmation;
pub mod health;
pub mod preview;
pub mod settings;
