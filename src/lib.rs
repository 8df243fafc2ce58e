pub mod auth;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod token;
pub mod views;
