pub mod classify;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod proximity;
pub mod report;
