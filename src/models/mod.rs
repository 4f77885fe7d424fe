pub mod alert;
pub mod delivery;
pub mod location;
pub mod photo;
pub mod settings;
