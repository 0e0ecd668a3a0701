pub mod data_stream;
pub mod error;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod routes;
