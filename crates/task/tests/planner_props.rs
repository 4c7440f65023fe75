use kforge_core::Error;
use kforge_task::{find_cycles, plan_waves, DependencyGraph, TaskKey};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn key(i: usize) -> TaskKey {
    TaskKey::new("Task", &format!("t{i:02}"))
}

/// Graph over `n` tasks; `(a, b)` means task `b` depends on task `a`
fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_task(key(i));
    }
    for &(before, after) in edges {
        graph.add_dependency(key(after), key(before));
    }
    graph
}

fn depends_on(graph: &DependencyGraph, task: &TaskKey, dep: &TaskKey) -> bool {
    graph.dependencies_of(task).any(|d| d == dep)
}

fn acyclic_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..16).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

fn any_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..10).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..n * 2)))
}

proptest! {
    #[test]
    fn every_task_lands_in_exactly_one_wave((n, edges) in acyclic_graph()) {
        let graph = build(n, &edges);
        let plan = plan_waves(&graph).unwrap();

        prop_assert_eq!(plan.task_count(), n);
        let unique: BTreeSet<&TaskKey> = plan.waves.iter().flatten().collect();
        prop_assert_eq!(unique.len(), n);
        for wave in &plan.waves {
            prop_assert!(!wave.is_empty());
            prop_assert!(wave.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn dependencies_run_in_earlier_waves((n, edges) in acyclic_graph()) {
        let graph = build(n, &edges);
        let plan = plan_waves(&graph).unwrap();

        for (before, after) in graph.edges() {
            let before_wave = plan.wave_of(&before).unwrap();
            let after_wave = plan.wave_of(&after).unwrap();
            prop_assert!(before_wave < after_wave, "{} must precede {}", before, after);
        }
    }

    #[test]
    fn reported_cycles_are_real((n, edges) in any_graph()) {
        let graph = build(n, &edges);

        match plan_waves(&graph) {
            Ok(plan) => {
                let all: BTreeSet<TaskKey> = graph.keys().cloned().collect();
                prop_assert!(find_cycles(&graph, &all).is_empty());
                prop_assert_eq!(plan.task_count(), n);
            }
            Err(Error::DependencyCycle { path }) => {
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
                let keys: Vec<TaskKey> = path.iter().map(|k| TaskKey::from(k.as_str())).collect();
                for pair in keys.windows(2) {
                    prop_assert!(
                        depends_on(&graph, &pair[1], &pair[0]),
                        "{} does not depend on {}", pair[1], pair[0]
                    );
                }
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
