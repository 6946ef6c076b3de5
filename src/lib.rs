pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod legacy;
pub mod lifecycle;
pub mod sequence;

pub use self::config::Config;
