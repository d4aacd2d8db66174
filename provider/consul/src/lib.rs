#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Service discovery against the Consul catalog.
//!
//! [`CachingResolver`] answers function-name lookups from a push-maintained
//! cache: the first lookup fetches from the catalog and subscribes a
//! blocking-query watch, after which updates arrive asynchronously.

mod catalog;
mod resolver;
mod watch;

pub use self::{
    catalog::{Catalog, CatalogError, CatalogResponse, CatalogService, HttpCatalog, WaitIndex},
    resolver::CachingResolver,
};
