pub mod bridge;
pub mod config;
pub mod daemon;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod indexer;
