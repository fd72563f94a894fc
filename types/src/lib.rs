//! Core domain types for Nimbus - no IO, no async.
//!
//! These are the records the typed client decodes platform responses into.
//! Field names follow the platform wire format (camelCase) via serde; Rust
//! code uses snake_case accessors on the structs themselves.

mod auth;
mod build;
mod platform;

pub use auth::{Region, RegionParseError, UserInfo};
pub use build::{BuildRun, BuildStatus, DeploymentStatus, DeploymentTrack, Environment};
pub use platform::{
    Component, ComponentEndpoint, Connection, CreateComponentRequest, CreateProjectRequest,
    EnvironmentTier, Org, Project,
};
