//! List and delete options, plus the selector matching used by the
//! in-memory store.

use crate::error::{ClientError, ClientResult};
use kube::api::{DeleteParams, ListParams, PropagationPolicy};
use std::collections::BTreeMap;

/// Options for `List`; the default selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    pub fn labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    pub fn fields(mut self, selector: &str) -> Self {
        self.field_selector = Some(selector.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn to_list_params(&self) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(labels) = &self.label_selector {
            lp = lp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            lp = lp.fields(fields);
        }
        if let Some(limit) = self.limit {
            lp = lp.limit(limit);
        }
        lp
    }
}

/// How dependents are handled on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Orphan,
    Background,
    Foreground,
}

/// Delete is refused with `Conflict` unless these match the stored object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub resource_version: Option<String>,
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<u32>,
    pub propagation: Option<Propagation>,
    pub preconditions: Option<Preconditions>,
}

impl DeleteOptions {
    pub fn grace_period(mut self, seconds: u32) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = Some(propagation);
        self
    }

    pub fn preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = Some(preconditions);
        self
    }

    pub(crate) fn to_delete_params(&self) -> DeleteParams {
        DeleteParams {
            grace_period_seconds: self.grace_period_seconds,
            propagation_policy: self.propagation.map(|p| match p {
                Propagation::Orphan => PropagationPolicy::Orphan,
                Propagation::Background => PropagationPolicy::Background,
                Propagation::Foreground => PropagationPolicy::Foreground,
            }),
            preconditions: self.preconditions.as_ref().map(|p| kube::api::Preconditions {
                resource_version: p.resource_version.clone(),
                uid: p.uid.clone(),
            }),
            ..Default::default()
        }
    }
}

/// One term of a label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

impl LabelRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            LabelRequirement::Equals(k, v) => labels.get(k) == Some(v),
            LabelRequirement::NotEquals(k, v) => labels.get(k) != Some(v),
            LabelRequirement::Exists(k) => labels.contains_key(k),
            LabelRequirement::NotExists(k) => !labels.contains_key(k),
        }
    }
}

/// Parsed equality-based label selector (`a=b,c!=d,e,!f`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn parse(selector: &str) -> ClientResult<Self> {
        let mut requirements = Vec::new();
        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let requirement = if let Some((k, v)) = term.split_once("!=") {
                LabelRequirement::NotEquals(valid_key(k)?, v.trim().to_string())
            } else if let Some((k, v)) = term.split_once("==") {
                LabelRequirement::Equals(valid_key(k)?, v.trim().to_string())
            } else if let Some((k, v)) = term.split_once('=') {
                LabelRequirement::Equals(valid_key(k)?, v.trim().to_string())
            } else if let Some(k) = term.strip_prefix('!') {
                LabelRequirement::NotExists(valid_key(k)?)
            } else {
                LabelRequirement::Exists(valid_key(term)?)
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let empty = BTreeMap::new();
        let labels = labels.unwrap_or(&empty);
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

fn valid_key(key: &str) -> ClientResult<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains('!') {
        return Err(ClientError::Invalid(format!("invalid label key {key:?}")));
    }
    Ok(key.to_string())
}

/// Parsed field selector; only object name and namespace are indexed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    terms: Vec<(String, bool, String)>,
}

impl FieldSelector {
    pub fn parse(selector: &str) -> ClientResult<Self> {
        let mut terms = Vec::new();
        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (field, equal, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, false, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, true, v)
            } else {
                return Err(ClientError::Invalid(format!("invalid field selector term {term:?}")));
            };
            let field = field.trim();
            if field != "metadata.name" && field != "metadata.namespace" {
                return Err(ClientError::Invalid(format!("field label not supported: {field}")));
            }
            terms.push((field.to_string(), equal, value.trim().to_string()));
        }
        Ok(Self { terms })
    }

    pub fn matches(&self, name: &str, namespace: &str) -> bool {
        self.terms.iter().all(|(field, equal, value)| {
            let actual = if field == "metadata.name" { name } else { namespace };
            (actual == value) == *equal
        })
    }
}
