pub mod builtin;
pub mod catalog;
pub mod definition;
pub mod executor;
pub mod export;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod sqlite;
