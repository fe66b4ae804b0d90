//! Background workers

pub mod ingester;
