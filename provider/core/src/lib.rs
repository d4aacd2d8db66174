#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Shared domain types and trait seams for the OpenFaaS Nomad provider.

mod metrics;
mod requests;
mod resolve;

pub use self::{
    metrics::{NoopStats, Stats},
    requests::{
        DeleteFunctionRequest, Function, FunctionDeployment, FunctionResources, InfoResponse,
        ProviderVersion, ScaleServiceRequest, SecretRequest,
    },
    resolve::{ResolveError, Resolver},
};
