pub mod config;
pub mod gateway;
pub mod handlers;
pub mod inventory;
pub mod lifecycle;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod routes;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod tickets;
pub mod utils;
