#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Nomad job model, HTTP API client, and the function → job translation.

mod api;
mod job;
mod tls;
mod translate;

pub use self::{
    api::{ApiError, HttpJobs, Jobs},
    job::{
        AllocationListStub, ConfigValue, Constraint, EphemeralDisk, Job, JobListStub,
        JobRegisterResponse, NetworkResource, Port, Resources, RestartPolicy, Service, Task,
        TaskGroup, TaskState, Template, UpdateStrategy, VaultStanza,
    },
    tls::{TlsError, TlsSettings},
    translate::{job_from_deployment, TranslateConfig},
};

/// Prefix applied to every job the provider owns; list/info strip it before
/// reporting function names back to the gateway.
pub const JOB_PREFIX: &str = "OpenFaaS-";
