pub mod config;
pub mod db;
pub mod fetch;
pub mod importer;
pub mod logging;
pub mod media;
pub mod worker;
