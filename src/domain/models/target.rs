//! Target resolution model.
//!
//! An experiment references three cluster objects: the front-end service and
//! the baseline/candidate workloads. Each is either observed-present or
//! observed-missing; resolution is purely observational.

use serde::{Deserialize, Serialize};

/// Key of a watched cluster object: name plus namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of observing one target object in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    /// The object exists in the cluster.
    Present,
    /// The name is known but the object is not in the cluster.
    Missing,
}

impl Observation {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

/// One resolved target reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
    pub key: ObjectKey,
    pub observation: Observation,
}

/// The three references resolved from the cluster for one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBundle {
    pub service: TargetReference,
    pub baseline: TargetReference,
    pub candidate: TargetReference,
}

impl TargetBundle {
    /// Whether all three targets are observed-present.
    pub fn all_present(&self) -> bool {
        self.service.observation.is_present()
            && self.baseline.observation.is_present()
            && self.candidate.observation.is_present()
    }

    /// Keys of the targets currently missing, in service/baseline/candidate
    /// order.
    pub fn missing(&self) -> Vec<&ObjectKey> {
        [&self.service, &self.baseline, &self.candidate]
            .into_iter()
            .filter(|r| !r.observation.is_present())
            .map(|r| &r.key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, observation: Observation) -> TargetReference {
        TargetReference {
            key: ObjectKey::new(name, "default"),
            observation,
        }
    }

    #[test]
    fn test_all_present_requires_all_three() {
        let bundle = TargetBundle {
            service: reference("svc", Observation::Present),
            baseline: reference("v1", Observation::Present),
            candidate: reference("v2", Observation::Missing),
        };
        assert!(!bundle.all_present());
        assert_eq!(bundle.missing().len(), 1);
        assert_eq!(bundle.missing()[0].name, "v2");

        let bundle = TargetBundle {
            service: reference("svc", Observation::Present),
            baseline: reference("v1", Observation::Present),
            candidate: reference("v2", Observation::Present),
        };
        assert!(bundle.all_present());
        assert!(bundle.missing().is_empty());
    }

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::new("reviews-v2", "bookinfo");
        assert_eq!(key.to_string(), "bookinfo/reviews-v2");
    }
}
