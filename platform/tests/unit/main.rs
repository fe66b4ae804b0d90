//! Unit test suite


mod test_dispatcher;
mod test_file_store;
mod test_ingestion;
mod test_routing;
mod test_scenarios;
