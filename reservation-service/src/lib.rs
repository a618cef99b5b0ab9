pub mod access;
pub mod api;
pub mod backend;
pub mod booking;
pub mod messaging;
pub mod models;
pub mod schema;
pub mod storage;
pub mod stores;
pub mod views;
