//! Kubernetes API types read and written by the controller.
//!
//! - [`YttSource`]: the object this controller reconciles.
//! - [`GitRepository`], [`OCIRepository`], [`Bucket`]: Flux source objects
//!   publishing a fetchable artifact in their status.
//!
//! ConfigMaps and Secrets come straight from `k8s-openapi`.

pub mod flux;
pub mod yttsource;

pub use flux::{
    Artifact, ArtifactSource, Bucket, BucketSpec, GitRepository, GitRepositorySpec,
    OCIRepository, OCIRepositorySpec, SourceStatus,
};
pub use yttsource::{YttSource, YttSourceSpec, YttSourceStatus};
