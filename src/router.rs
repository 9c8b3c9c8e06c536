//! Weighted random host selection.
//!
//! Draws a uniform `hit` in `[0, total_weight)` and walks the host list
//! accumulating weight, returning the first host whose cumulative weight
//! exceeds `hit`. The comparison is a strict `hit < cumulative`, so every
//! host (including the last) is chosen with probability proportional to
//! its own weight rather than picking up any slack from a non-strict
//! comparison.

use std::collections::HashMap;

use rand::Rng;

use crate::error::{DubboError, DubboResult};

const DEFAULT_WEIGHT: u32 = 100;

/// Picks one host from `hosts` using `weights` (missing hosts default to
/// [`DEFAULT_WEIGHT`]). Uniform random when `weights` is empty.
pub fn pick(interface: &str, hosts: &[String], weights: &HashMap<String, u32>) -> DubboResult<String> {
    if hosts.is_empty() {
        return Err(DubboError::register(format!(
            "no providers for interface {interface}"
        )));
    }

    if weights.is_empty() {
        let idx = rand::rng().random_range(0..hosts.len());
        return Ok(hosts[idx].clone());
    }

    let host_weights: Vec<u32> = hosts
        .iter()
        .map(|h| *weights.get(h).unwrap_or(&DEFAULT_WEIGHT))
        .collect();
    let total: u32 = host_weights.iter().sum();
    if total == 0 {
        return Err(DubboError::register(format!(
            "zero total weight for interface {interface}"
        )));
    }

    let hit = rand::rng().random_range(0..total);
    let mut cumulative = 0u32;
    for (host, weight) in hosts.iter().zip(host_weights.iter()) {
        cumulative += weight;
        if hit < cumulative {
            return Ok(host.clone());
        }
    }

    Err(DubboError::register(format!(
        "error finding [{interface}] host with weight"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_fails_on_empty_hosts() {
        let err = pick("com.example.Svc", &[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, DubboError::RegisterException(_)));
    }

    #[test]
    fn test_pick_uniform_without_weights() {
        let hosts = vec!["A".to_string(), "B".to_string()];
        for _ in 0..100 {
            let picked = pick("I", &hosts, &HashMap::new()).unwrap();
            assert!(hosts.contains(&picked));
        }
    }

    #[test]
    fn test_weighted_routing_frequency() {
        // Scenario 6: hosts=[A,B], weights={A:25,B:75}; over 10_000 draws
        // the A:B ratio should land near 1:3.
        let hosts = vec!["A".to_string(), "B".to_string()];
        let mut weights = HashMap::new();
        weights.insert("A".to_string(), 25u32);
        weights.insert("B".to_string(), 75u32);

        let mut count_a = 0u32;
        let mut count_b = 0u32;
        for _ in 0..10_000 {
            match pick("I", &hosts, &weights).unwrap().as_str() {
                "A" => count_a += 1,
                "B" => count_b += 1,
                other => panic!("unexpected host {other}"),
            }
        }

        let ratio = count_a as f64 / (count_a + count_b) as f64;
        assert!((ratio - 0.25).abs() < 0.05, "observed A ratio {ratio}");
    }

    #[test]
    fn test_pick_defaults_missing_host_weight_to_100() {
        let hosts = vec!["A".to_string(), "B".to_string()];
        let mut weights = HashMap::new();
        weights.insert("A".to_string(), 100u32);
        // B is missing -> defaults to 100, so this should behave like
        // uniform routing between the two.
        let mut seen_b = false;
        for _ in 0..200 {
            if pick("I", &hosts, &weights).unwrap() == "B" {
                seen_b = true;
                break;
            }
        }
        assert!(seen_b, "host B should still be reachable with default weight");
    }
}
