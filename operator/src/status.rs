use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};

pub const READY: &str = "Ready";
pub const NOT_READY: &str = "NotReady";

/// Suffix of the per-namespace keys in `ibm-common-services-status`.
pub const IAM_STATUS_SUFFIX: &str = "-iamstatus";
/// The folded key in `ibm-common-services-status`.
pub const IAM_STATUS_KEY: &str = "iamstatus";

pub fn iam_status_key(services_namespace: &str) -> String {
    format!("{services_namespace}{IAM_STATUS_SUFFIX}")
}

/// "Ready" iff every `*-iamstatus` entry is Ready. Otherwise the first
/// offending value in key order, or "NotReady" when there is nothing to fold.
pub fn check_overall_status(data: &BTreeMap<String, String>) -> String {
    let mut seen = false;
    for (key, value) in data {
        if !key.ends_with(IAM_STATUS_SUFFIX) {
            continue;
        }
        seen = true;
        if value != READY {
            return value.clone();
        }
    }
    if seen { READY.into() } else { NOT_READY.into() }
}

/// Any NotReady dominates; an empty set is Ready.
pub fn fold<I>(items: I) -> &'static str
where
    I: IntoIterator<Item = bool>,
{
    if items.into_iter().all(|ready| ready) {
        READY
    } else {
        NOT_READY
    }
}

pub fn ready_str(ready: bool) -> &'static str {
    if ready { READY } else { NOT_READY }
}

/// A workload is ready when it reports at least as many available replicas
/// as it asks for.
pub trait WorkloadReadiness {
    fn is_ready(&self) -> bool;
}

impl WorkloadReadiness for Deployment {
    fn is_ready(&self) -> bool {
        let desired = self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let available = self
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        available >= desired
    }
}

impl WorkloadReadiness for StatefulSet {
    fn is_ready(&self) -> bool {
        let desired = self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let ready = self
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        ready >= desired
    }
}

impl WorkloadReadiness for DaemonSet {
    fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.number_ready >= s.desired_number_scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn all_ready_is_ready() {
        let d = data(&[
            ("ibm-common-services-iamstatus", "Ready"),
            ("cs-b-iamstatus", "Ready"),
            ("iamstatus", "NotReady"),
        ]);
        assert_eq!(check_overall_status(&d), "Ready");
    }

    #[test]
    fn first_offender_in_key_order_wins() {
        let d = data(&[
            ("b-iamstatus", "Installing"),
            ("a-iamstatus", "NotReady"),
            ("c-iamstatus", "Ready"),
        ]);
        assert_eq!(check_overall_status(&d), "NotReady");

        let d = data(&[("a-iamstatus", "Ready"), ("b-iamstatus", "Installing")]);
        assert_eq!(check_overall_status(&d), "Installing");
    }

    #[test]
    fn nothing_to_fold_is_not_ready() {
        assert_eq!(check_overall_status(&BTreeMap::new()), "NotReady");
        assert_eq!(check_overall_status(&data(&[("other", "Ready")])), "NotReady");
    }

    #[test]
    fn not_ready_dominates() {
        assert_eq!(fold([true, true]), READY);
        assert_eq!(fold([true, false, true]), NOT_READY);
        assert_eq!(fold(std::iter::empty()), READY);
    }

    #[test]
    fn deployment_readiness_compares_replicas() {
        let mut deploy = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!deploy.is_ready());

        deploy.status.as_mut().unwrap().available_replicas = Some(2);
        assert!(deploy.is_ready());

        deploy.status = None;
        assert!(!deploy.is_ready());
    }
}
