pub mod config;
pub mod forge;
pub mod models;
pub mod util;
