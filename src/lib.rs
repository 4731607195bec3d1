pub mod api;
pub mod config;
pub mod db;
pub mod report;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::Database;
pub use worker::Tracker;
