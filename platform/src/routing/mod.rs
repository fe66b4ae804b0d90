//! Subdomain routing
//!
//! Every inbound request is resolved from its `Host` to a deployment and
//! forwarded to that deployment's artifacts.

pub mod lookup;
pub mod proxy;
pub mod resolver;

pub use lookup::{ApiSlugLookup, CachedSlugLookup, RegistryLookup, SlugLookup};
pub use resolver::{RoutingResolver, RoutingTarget};
