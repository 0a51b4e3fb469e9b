//! Cluster Classification
//!
//! Heuristics over build parameters describing the environment a build ran
//! against. The result is context for the evidence, never a verdict.

use std::collections::BTreeMap;

use ci_triage_core::{ClusterConnectivity, ClusterTopology, ClusterType};

/// Parameters naming the environment endpoint, in priority order.
pub const ENDPOINT_PARAMS: &[&str] = &[
    "CLUSTER_URL",
    "CLUSTER_API_URL",
    "ENV_URL",
    "TARGET_URL",
    "BASE_URL",
    "CONSOLE_URL",
    "API_URL",
];

const DISCONNECTED_MARKERS: &[&str] = &["DISCONNECTED", "AIRGAP", "AIR_GAP", "AIR-GAP"];
const SINGLE_NODE_MARKERS: &[&str] = &["SNO", "SINGLE_NODE", "SINGLE-NODE", "SINGLENODE"];
const MULTI_NODE_MARKERS: &[&str] = &["MULTI_NODE", "MULTI-NODE", "MULTINODE", "COMPACT", "HA"];

pub fn classify_cluster_type(parameters: &BTreeMap<String, String>) -> ClusterType {
    ClusterType {
        connectivity: connectivity(parameters),
        topology: topology(parameters),
        endpoint: endpoint(parameters),
    }
}

fn connectivity(parameters: &BTreeMap<String, String>) -> ClusterConnectivity {
    let mut result = ClusterConnectivity::Unknown;
    for (key, value) in parameters {
        let key = key.to_ascii_uppercase();
        let upper = value.trim().to_ascii_uppercase();
        if has_marker(&key, DISCONNECTED_MARKERS) {
            match truthy(&upper) {
                Some(true) => return ClusterConnectivity::Disconnected,
                Some(false) => result = ClusterConnectivity::Connected,
                None => {}
            }
        } else if has_marker(&upper, DISCONNECTED_MARKERS) {
            return ClusterConnectivity::Disconnected;
        } else if key.contains("MIRROR") && !upper.is_empty() && truthy(&upper) != Some(false) {
            return ClusterConnectivity::Disconnected;
        } else if upper == "CONNECTED" {
            result = ClusterConnectivity::Connected;
        }
    }
    result
}

fn topology(parameters: &BTreeMap<String, String>) -> ClusterTopology {
    for (key, value) in parameters {
        let key = key.to_ascii_uppercase();
        let upper = value.trim().to_ascii_uppercase();

        if is_node_count(&key) {
            if let Ok(count) = upper.parse::<u32>() {
                return if count <= 1 {
                    ClusterTopology::SingleNode
                } else {
                    ClusterTopology::MultiNode
                };
            }
        }
        if has_marker(&key, SINGLE_NODE_MARKERS) && truthy(&upper) == Some(true) {
            return ClusterTopology::SingleNode;
        }
        if token_marker(&upper, SINGLE_NODE_MARKERS) {
            return ClusterTopology::SingleNode;
        }
        if token_marker(&upper, MULTI_NODE_MARKERS) {
            return ClusterTopology::MultiNode;
        }
    }
    ClusterTopology::Unknown
}

fn endpoint(parameters: &BTreeMap<String, String>) -> Option<String> {
    ENDPOINT_PARAMS.iter().find_map(|name| {
        parameters
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.trim().is_empty())
            .map(|(_, v)| {
                let v = v.trim().trim_end_matches('/');
                if v.starts_with("http://") || v.starts_with("https://") {
                    v.to_string()
                } else {
                    format!("https://{}", v)
                }
            })
    })
}

fn is_node_count(key: &str) -> bool {
    (key.contains("NODE") || key.contains("WORKER"))
        && (key.contains("COUNT") || key.contains("NUM") || key.contains("REPLICAS"))
}

fn has_marker(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// Markers matched as whole `_`/`-`/space separated tokens, so `SNO` does
/// not fire inside `SNOWFLAKE`.
fn token_marker(text: &str, markers: &[&str]) -> bool {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    markers.iter().any(|m| {
        if m.contains(['_', '-']) {
            text.contains(m)
        } else {
            tokens.contains(m)
        }
    })
}

fn truthy(upper: &str) -> Option<bool> {
    match upper {
        "TRUE" | "YES" | "Y" | "1" | "ON" => Some(true),
        "FALSE" | "NO" | "N" | "0" | "OFF" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_disconnected_single_node() {
        let cluster = classify_cluster_type(&params(&[
            ("DISCONNECTED", "true"),
            ("CLUSTER_TYPE", "sno"),
            ("CLUSTER_URL", "https://console.lab.example.com/"),
        ]));
        assert_eq!(cluster.connectivity, ClusterConnectivity::Disconnected);
        assert_eq!(cluster.topology, ClusterTopology::SingleNode);
        assert_eq!(cluster.endpoint.as_deref(), Some("https://console.lab.example.com"));
    }

    #[test]
    fn test_mirror_registry_and_node_count() {
        let cluster = classify_cluster_type(&params(&[
            ("MIRROR_REGISTRY", "registry.lab:5000"),
            ("WORKER_COUNT", "3"),
        ]));
        assert_eq!(cluster.connectivity, ClusterConnectivity::Disconnected);
        assert_eq!(cluster.topology, ClusterTopology::MultiNode);
        assert_eq!(cluster.endpoint, None);
    }

    #[test]
    fn test_explicitly_connected_and_endpoint_priority() {
        let cluster = classify_cluster_type(&params(&[
            ("AIRGAP", "false"),
            ("base_url", "qa.example.com"),
            ("ENV_URL", "https://env.example.com"),
        ]));
        assert_eq!(cluster.connectivity, ClusterConnectivity::Connected);
        assert_eq!(cluster.topology, ClusterTopology::Unknown);
        assert_eq!(cluster.endpoint.as_deref(), Some("https://env.example.com"));
    }

    #[test]
    fn test_no_hints() {
        let cluster = classify_cluster_type(&params(&[("DATASET", "snowflake")]));
        assert_eq!(cluster, ClusterType::default());
    }
}
