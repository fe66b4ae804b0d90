//! Deployment lifecycle module

pub mod classifier;
pub mod dispatcher;
pub mod fsm;
pub mod registry;
