//! Application services layer.

pub mod catalog;
pub mod error;
pub mod inventory;
pub mod repos;
