pub mod commands;
pub mod error;
pub mod notify;
pub mod pagination;
pub mod repos;
pub mod view;
