//! Resume data synchronization between a hosted web page, its per-page
//! content bridge, and the background relay that owns the stored profile
//! document.

pub mod api_client;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod messages;
pub mod models;
pub mod page;
pub mod relay;
pub mod routes;
pub mod state;
pub mod store;
