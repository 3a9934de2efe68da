//! Built-in executors.

pub mod http;

pub use http::HttpCallExecutor;
