pub mod alert;
pub mod bridge;
pub mod config;
pub mod db;
pub mod feed;
pub mod gateway;
pub mod geo;
pub mod models;
pub mod processor;
pub mod sync;
pub mod tracker;
