//! # Resource kind descriptor
//!
//! Capability set needed to store, watch and register a custom resource.

use k8s_openapi::NamespaceResourceScope;
use kube::{CustomResourceExt, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A namespaced custom resource kind usable with the generic client.
///
/// Serialization comes from serde, naming (kind, group, plural) from
/// [`Resource`], and the CRD manifest from [`CustomResourceExt`].
pub trait ResourceKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + CustomResourceExt
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Observed state, written through the status subresource
    type Status: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;

    fn status_mut(&mut self) -> &mut Option<Self::Status>;

    /// One-line rendering of spec and status for log output
    fn summary(&self) -> String;
}

/// Kind name, e.g. `Example`
pub fn kind_name<K: ResourceKind>() -> String {
    K::kind(&()).into_owned()
}

/// Plural resource name used in REST paths, e.g. `examples`
pub fn plural_name<K: ResourceKind>() -> String {
    K::plural(&()).into_owned()
}

/// Fully qualified CRD name, `<plural>.<group>`
pub fn crd_name<K: ResourceKind>() -> String {
    format!("{}.{}", K::plural(&()), K::group(&()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Example, ExampleState};

    #[test]
    fn test_descriptor_names() {
        assert_eq!(kind_name::<Example>(), "Example");
        assert_eq!(plural_name::<Example>(), "examples");
        assert_eq!(crd_name::<Example>(), "examples.myorg.io");

        assert_eq!(kind_name::<ExampleState>(), "ExampleState");
        assert_eq!(plural_name::<ExampleState>(), "examplestates");
        assert_eq!(crd_name::<ExampleState>(), "examplestates.myorg.io");
    }
}
