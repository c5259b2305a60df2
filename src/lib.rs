// Library entrypoint for the binaries and integration tests.
pub mod api;
pub mod auth;
pub mod config;
pub mod images;
pub mod migrate;
pub mod shutdown;
pub mod state;
pub mod storage;
