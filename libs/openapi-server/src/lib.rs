//! Wire models for the Launchpad control API

pub mod models;
