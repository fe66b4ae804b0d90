//! Wire models for the Launchpad collaborators (task runner, log store, control API)

pub mod models;
