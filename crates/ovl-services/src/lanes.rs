// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency lane computation: `StartOrder`/`StopOrder` over `requires`,
//! `before`, and `after` edges. A lane is a set of services safe to start
//! (or stop) in parallel; lanes themselves run in sequence.

use ovl_plan::Plan;
use std::collections::{HashMap, HashSet, VecDeque};

/// `requires(b)` on `a` both makes `a` depend on `b` starting first and
/// pulls `b` into the requested set if the caller didn't name it.
fn close_over_requires(plan: &Plan, requested: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = requested.iter().cloned().collect();
    let mut closure = Vec::new();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        closure.push(name.clone());
        if let Some(cfg) = plan.service(&name) {
            for dep in &cfg.requires {
                if !seen.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        }
    }
    closure
}

/// `(before, after)` pairs meaning `before` must start before `after`.
/// `requires` pulls a dependency into the requested set (see
/// `close_over_requires`) but imposes no ordering of its own — ordering
/// comes exclusively from `after`/`before`.
fn start_edges(plan: &Plan, names: &HashSet<String>) -> Vec<(String, String)> {
    let mut edges = Vec::new();
    for name in names {
        let Some(cfg) = plan.service(name) else { continue };
        for dep in &cfg.after {
            if names.contains(dep) {
                edges.push((dep.clone(), name.clone()));
            }
        }
        for dependent in &cfg.before {
            if names.contains(dependent) {
                edges.push((name.clone(), dependent.clone()));
            }
        }
    }
    edges
}

/// Kahn's algorithm, layer by layer: each lane is every remaining node
/// whose predecessors already landed in an earlier lane.
fn layer(names: Vec<String>, edges: &[(String, String)]) -> Vec<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for (before, after) in edges {
        *indegree.entry(after.as_str()).or_insert(0) += 1;
        successors.entry(before.as_str()).or_default().push(after.as_str());
    }

    let mut remaining: HashSet<&str> = names.iter().map(|n| n.as_str()).collect();
    let mut lanes = Vec::new();
    while !remaining.is_empty() {
        let mut lane: Vec<&str> = remaining.iter().copied().filter(|n| indegree[n] == 0).collect();
        if lane.is_empty() {
            // A cycle somewhere in the requested set: take whatever is left
            // rather than loop forever. Cycle detection at plan-load time
            // is out of scope here.
            lane = remaining.iter().copied().collect();
        }
        lane.sort_unstable();
        for n in &lane {
            remaining.remove(n);
        }
        for n in &lane {
            if let Some(succs) = successors.get(n) {
                for s in succs {
                    if let Some(count) = indegree.get_mut(s) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        lanes.push(lane.into_iter().map(str::to_string).collect());
    }
    lanes
}

/// One or more lanes of service names, earliest lane first, safe to start
/// each lane's members in parallel.
pub fn start_order(plan: &Plan, requested: &[String]) -> Vec<Vec<String>> {
    let closure = close_over_requires(plan, requested);
    let names_set: HashSet<String> = closure.iter().cloned().collect();
    let edges = start_edges(plan, &names_set);
    layer(closure, &edges)
}

/// The reverse of [`start_order`], lane for lane.
pub fn stop_order(plan: &Plan, requested: &[String]) -> Vec<Vec<String>> {
    let mut lanes = start_order(plan, requested);
    lanes.reverse();
    lanes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovl_plan::ServiceConfig;

    fn plan_with(services: &[(&str, ServiceConfig)]) -> Plan {
        let mut plan = Plan::default();
        for (name, cfg) in services {
            plan.services.insert((*name).to_string(), cfg.clone());
        }
        plan
    }

    #[test]
    fn independent_services_land_in_one_lane() {
        let plan = plan_with(&[("a", ServiceConfig::new("true")), ("b", ServiceConfig::new("true"))]);
        let lanes = start_order(&plan, &["a".to_string(), "b".to_string()]);
        assert_eq!(lanes.len(), 1);
        assert_eq!(lanes[0].len(), 2);
    }

    #[test]
    fn after_forces_a_separate_later_lane() {
        let plan = plan_with(&[
            ("a", ServiceConfig::new("true")),
            ("b", ServiceConfig { after: vec!["a".to_string()], ..ServiceConfig::new("true") }),
        ]);
        let lanes = start_order(&plan, &["a".to_string(), "b".to_string()]);
        assert_eq!(lanes, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn before_is_the_symmetric_opposite_of_after() {
        let plan = plan_with(&[
            ("a", ServiceConfig { before: vec!["b".to_string()], ..ServiceConfig::new("true") }),
            ("b", ServiceConfig::new("true")),
        ]);
        let lanes = start_order(&plan, &["a".to_string(), "b".to_string()]);
        assert_eq!(lanes, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn requires_pulls_in_an_unlisted_dependency_but_does_not_order_it() {
        let plan = plan_with(&[
            ("a", ServiceConfig { requires: vec!["b".to_string()], ..ServiceConfig::new("true") }),
            ("b", ServiceConfig::new("true")),
        ]);
        let lanes = start_order(&plan, &["a".to_string()]);
        // `requires` is a pure inclusion rule: it pulls "b" into the
        // requested set but, absent an `after`/`before` edge, the two land
        // in the same lane rather than being sequenced.
        assert_eq!(lanes, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn requires_and_before_together_do_not_form_a_bogus_cycle() {
        // test1.requires = [test2], test1.before = [test2], test3.after = [test2].
        let plan = plan_with(&[
            (
                "test1",
                ServiceConfig {
                    requires: vec!["test2".to_string()],
                    before: vec!["test2".to_string()],
                    ..ServiceConfig::new("true")
                },
            ),
            ("test2", ServiceConfig::new("true")),
            ("test3", ServiceConfig { after: vec!["test2".to_string()], ..ServiceConfig::new("true") }),
        ]);
        let lanes = start_order(&plan, &["test3".to_string(), "test1".to_string()]);
        assert_eq!(
            lanes,
            vec![vec!["test1".to_string()], vec!["test2".to_string()], vec!["test3".to_string()]]
        );
    }

    #[test]
    fn stop_order_reverses_start_order_lane_for_lane() {
        let plan = plan_with(&[
            ("a", ServiceConfig::new("true")),
            ("b", ServiceConfig { after: vec!["a".to_string()], ..ServiceConfig::new("true") }),
        ]);
        let starts = start_order(&plan, &["a".to_string(), "b".to_string()]);
        let stops = stop_order(&plan, &["a".to_string(), "b".to_string()]);
        assert_eq!(stops, vec![starts[1].clone(), starts[0].clone()]);
    }
}
