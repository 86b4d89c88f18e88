//! Configuration files and on-disk layout

pub mod inventory;
pub mod layout;
pub mod settings;
pub mod skeleton;
