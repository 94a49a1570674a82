//! WeCom Callback Relay Server
//!
//! Verifies, decrypts and classifies enterprise messaging callbacks, then
//! relays them to each tenant's automation endpoint.

pub mod api;
pub mod audit;
pub mod callback;
pub mod config;
pub mod connections;
pub mod db;
