//! Launchpad Library
//!
//! Deployment lifecycle engine of a small platform-as-a-service: project and
//! deployment registry, build dispatch, build log ingestion and subdomain
//! routing to build artifacts.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod ingest;
pub mod logs;
pub mod models;
pub mod routing;
pub mod runner;
pub mod server;
pub mod storage;
pub mod store;
pub mod stream;
pub mod utils;
pub mod workers;
