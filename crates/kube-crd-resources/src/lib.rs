//! # kube-crd resources
//!
//! Custom resource types managed by the demo and the `ResourceKind`
//! descriptor that the generic client and watcher are parameterized over.

pub mod crds;
pub mod kind;

pub use crds::*;
pub use kind::*;

/// API group shared by every custom resource in this crate
pub const CRD_GROUP: &str = "myorg.io";

/// API version shared by every custom resource in this crate
pub const CRD_VERSION: &str = "v1";
