//! Readiness predicates.
//!
//! A conservative built-in table of `kind -> readyWhen` expressions over
//! `${self.…}`, overridable per kind by the caller. Kinds outside the
//! table get no predicate: claiming readiness semantics for arbitrary
//! custom resources would be guesswork.

use std::collections::BTreeMap;

/// Built-in predicates for workload kinds with well-known status contracts.
pub fn default_ready_when(kind: &str) -> Option<Vec<String>> {
    let predicates: &[&str] = match kind {
        "Deployment" => &["${self.status.availableReplicas == self.spec.replicas}"],
        "StatefulSet" => &["${self.status.readyReplicas == self.spec.replicas}"],
        "DaemonSet" => {
            &["${self.status.numberReady == self.status.desiredNumberScheduled}"]
        }
        "Job" => &["${self.status.succeeded > 0}"],
        "PersistentVolumeClaim" => &["${self.status.phase == \"Bound\"}"],
        _ => return None,
    };
    Some(predicates.iter().map(|p| p.to_string()).collect())
}

/// Resolve the predicates for a kind: caller overrides replace built-ins
/// wholesale; an explicit empty override suppresses them.
pub fn ready_when_for(
    kind: &str,
    overrides: &BTreeMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    match overrides.get(kind) {
        Some(list) if list.is_empty() => None,
        Some(list) => Some(list.clone()),
        None => default_ready_when(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_kinds_have_predicates() {
        assert!(default_ready_when("Deployment").is_some());
        assert!(default_ready_when("Job").is_some());
        assert!(default_ready_when("ConfigMap").is_none());
    }

    #[test]
    fn overrides_replace_and_suppress() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Deployment".to_string(),
            vec!["${self.status.updatedReplicas > 0}".to_string()],
        );
        overrides.insert("Job".to_string(), Vec::new());

        let deployment = ready_when_for("Deployment", &overrides).unwrap();
        assert_eq!(deployment, vec!["${self.status.updatedReplicas > 0}"]);
        assert!(ready_when_for("Job", &overrides).is_none());
        assert!(ready_when_for("StatefulSet", &overrides).is_some());
    }
}
