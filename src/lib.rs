pub mod app;
pub mod classify;
pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod ntfy;
pub mod report;
