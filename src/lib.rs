pub mod app_error;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod playlist;
pub mod poller;
pub mod stream;
pub mod transcoder;
