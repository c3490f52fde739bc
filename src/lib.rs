pub mod cli;
pub mod config;
pub mod controller;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod recovery;

pub use db::Database;
