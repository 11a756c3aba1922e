//! Pod readiness rules.
//!
//! A web replica counts as ready when its `Ready` condition is `True`
//! and the named workload container reports `ready`. Pods without an IP
//! cannot be probed and are left out.

use crate::model::Pod;

/// Whether the pod's `Ready` condition is `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .conditions
        .iter()
        .any(|c| c.kind == "Ready" && c.status == "True")
}

/// Whether `container` inside the pod has passed its readiness probe.
pub fn is_container_ready(pod: &Pod, container: &str) -> bool {
    pod.status
        .container_statuses
        .iter()
        .any(|cs| cs.name == container && cs.ready)
}

/// Pod and container ready, and an IP assigned.
pub fn is_serving(pod: &Pod, container: &str) -> bool {
    is_pod_ready(pod) && is_container_ready(pod, container) && pod.status.pod_ip.is_some()
}

/// `(name, ip)` of every serving pod, in input order.
pub fn serving_pods<'a>(
    pods: impl IntoIterator<Item = &'a Pod>,
    container: &str,
) -> Vec<(String, String)> {
    pods.into_iter()
        .filter(|p| is_serving(p, container))
        .filter_map(|p| {
            p.status
                .pod_ip
                .as_ref()
                .map(|ip| (p.metadata.name.clone(), ip.clone()))
        })
        .collect()
}

/// Percent-encoded `app=<app>,role=<role>` selector for a query string.
pub fn label_selector(app: &str, role: &str) -> String {
    format!("app%3D{app}%2Crole%3D{role}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerStatus, ObjectMeta, PodCondition, PodStatus};

    fn pod(name: &str, ready: bool, containers: &[(&str, bool)], ip: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: name.to_string(),
                ..Default::default()
            },
            status: PodStatus {
                pod_ip: ip.map(str::to_string),
                conditions: vec![PodCondition {
                    kind: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                }],
                container_statuses: containers
                    .iter()
                    .map(|(n, r)| ContainerStatus {
                        name: n.to_string(),
                        ready: *r,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn pod_ready_condition() {
        assert!(is_pod_ready(&pod("a", true, &[], None)));
        assert!(!is_pod_ready(&pod("b", false, &[], None)));
        assert!(!is_pod_ready(&Pod::default()));
    }

    #[test]
    fn container_readiness_is_per_name() {
        let p = pod("a", true, &[("web", true), ("other", false)], None);
        assert!(is_container_ready(&p, "web"));
        assert!(!is_container_ready(&p, "other"));
        assert!(!is_container_ready(&p, "missing"));
    }

    #[test]
    fn serving_pods_filters_and_keeps_order() {
        let pods = vec![
            pod("web-c", true, &[("web", true), ("other", false)], Some("10.0.0.3")),
            pod("web-a", true, &[("web", true)], Some("10.0.0.1")),
            pod("web-b", true, &[("web", false), ("other", true)], Some("10.0.0.2")),
            pod("web-d", false, &[("web", true)], Some("10.0.0.4")),
            pod("web-e", true, &[("web", true)], None),
        ];

        assert_eq!(
            serving_pods(&pods, "web"),
            vec![
                ("web-c".to_string(), "10.0.0.3".to_string()),
                ("web-a".to_string(), "10.0.0.1".to_string()),
            ]
        );
    }

    #[test]
    fn selector_is_encoded() {
        assert_eq!(label_selector("my_app", "web"), "app%3Dmy_app%2Crole%3Dweb");
    }
}
