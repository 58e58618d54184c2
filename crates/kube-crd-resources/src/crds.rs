//! # Custom Resource Definitions
//!
//! The two demo kinds. They share a group and a status shape but carry
//! different spec fields.

use crate::kind::ResourceKind;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status message given to freshly created demo objects
pub const CREATED_MESSAGE: &str = "Created, not processed yet";

/// Example CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "myorg.io",
    version = "v1",
    kind = "Example",
    plural = "examples",
    derive = "PartialEq",
    namespaced
)]
#[kube(status = "ExampleStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExampleSpec {
    pub foo: String,
    pub bar: bool,
}

/// Reported state of an Example
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExampleStatus {
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub message: String,
}

impl Example {
    /// Demo object with the label and initial status the demo writes
    pub fn sample(name: &str) -> Self {
        let mut example = Example::new(
            name,
            ExampleSpec {
                foo: "example-text".to_string(),
                bar: true,
            },
        );
        example.metadata.labels = Some(BTreeMap::from([(
            "mylabel".to_string(),
            "test".to_string(),
        )]));
        example.status = Some(ExampleStatus {
            state: "created".to_string(),
            message: CREATED_MESSAGE.to_string(),
        });
        example
    }
}

impl ResourceKind for Example {
    type Status = ExampleStatus;

    fn status(&self) -> Option<&ExampleStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<ExampleStatus> {
        &mut self.status
    }

    fn summary(&self) -> String {
        let status = self.status.clone().unwrap_or_default();
        format!(
            "{} foo={:?} bar={} state={:?} message={:?}",
            self.metadata.name.as_deref().unwrap_or("<unnamed>"),
            self.spec.foo,
            self.spec.bar,
            status.state,
            status.message
        )
    }
}

/// ExampleState CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "myorg.io",
    version = "v1",
    kind = "ExampleState",
    plural = "examplestates",
    derive = "PartialEq",
    namespaced
)]
#[kube(status = "ExampleStateStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExampleStateSpec {
    pub what: String,
    pub up: bool,
}

/// Reported state of an ExampleState
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExampleStateStatus {
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub message: String,
}

impl ExampleState {
    pub fn sample(name: &str) -> Self {
        let mut state = ExampleState::new(
            name,
            ExampleStateSpec {
                what: "example-text".to_string(),
                up: true,
            },
        );
        state.metadata.labels = Some(BTreeMap::from([(
            "mylabel".to_string(),
            "check".to_string(),
        )]));
        state.status = Some(ExampleStateStatus {
            state: "created".to_string(),
            message: CREATED_MESSAGE.to_string(),
        });
        state
    }
}

impl ResourceKind for ExampleState {
    type Status = ExampleStateStatus;

    fn status(&self) -> Option<&ExampleStateStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<ExampleStateStatus> {
        &mut self.status
    }

    fn summary(&self) -> String {
        let status = self.status.clone().unwrap_or_default();
        format!(
            "{} what={:?} up={} state={:?} message={:?}",
            self.metadata.name.as_deref().unwrap_or("<unnamed>"),
            self.spec.what,
            self.spec.up,
            status.state,
            status.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_example_spec_serialization() {
        let spec = ExampleSpec {
            foo: "example-text".to_string(),
            bar: true,
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"foo": "example-text", "bar": true}));

        let back: ExampleSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_status_tolerates_missing_fields() {
        let status: ExampleStateStatus = serde_json::from_str(r#"{"state":"done"}"#).unwrap();
        assert_eq!(status.state, "done");
        assert!(status.message.is_empty());
    }

    #[test]
    fn test_sample_objects() {
        let example = Example::sample("example123");
        assert_eq!(example.metadata.name.as_deref(), Some("example123"));
        assert_eq!(
            example.metadata.labels.as_ref().unwrap().get("mylabel"),
            Some(&"test".to_string())
        );
        assert_eq!(example.status.as_ref().unwrap().state, "created");

        let state = ExampleState::sample("examplestate123");
        assert!(state.spec.up);
        assert_eq!(
            state.metadata.labels.as_ref().unwrap().get("mylabel"),
            Some(&"check".to_string())
        );
        assert_eq!(state.status.as_ref().unwrap().message, CREATED_MESSAGE);
    }

    #[test]
    fn test_summary_mentions_spec_and_status() {
        let summary = Example::sample("example123").summary();
        assert!(summary.starts_with("example123"));
        assert!(summary.contains("foo=\"example-text\""));
        assert!(summary.contains("state=\"created\""));
    }

    #[test]
    fn test_crd_generation() {
        let crd = Example::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("examples.myorg.io"));
        assert_eq!(crd.spec.group, "myorg.io");
        assert_eq!(crd.spec.names.kind, "Example");
        assert_eq!(crd.spec.names.plural, "examples");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1");

        let crd = ExampleState::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("examplestates.myorg.io"));
        assert_eq!(crd.spec.names.kind, "ExampleState");
    }

    #[test]
    fn test_crd_has_status_subresource() {
        let crd = ExampleState::crd();
        let subresources = crd.spec.versions[0].subresources.as_ref().unwrap();
        assert!(subresources.status.is_some());

        let yaml = serde_yaml::to_string(&crd).unwrap();
        assert!(yaml.contains("examplestates"));
    }
}
