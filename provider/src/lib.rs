#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! OpenFaaS provider for the Nomad scheduler.
//!
//! The control plane translates gateway deployment intents into Nomad jobs;
//! the data plane resolves function names through a Consul-backed cache and
//! proxies invocations across the discovered replicas with per-endpoint
//! circuit breaking and retries.

mod args;
mod handlers;
mod metrics;
mod proxy;
mod router;
mod vault;

pub use self::args::Args;
