use super::dependency::DependencyGraph;
use super::plan::ExecutionPlan;
use super::state::TaskStatus;
use crate::definition::TaskKey;
use kforge_core::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Layer the graph into waves with Kahn's algorithm
///
/// Each wave holds every task whose dependencies are all in earlier waves,
/// sorted by key. Fails with the concrete cycle path if layering stalls.
pub fn plan_waves(graph: &DependencyGraph) -> Result<ExecutionPlan> {
    let mut remaining: BTreeMap<&TaskKey, usize> = graph
        .keys()
        .map(|key| (key, graph.dependencies_of(key).count()))
        .collect();
    let mut waves = Vec::new();

    loop {
        let wave: Vec<TaskKey> = remaining
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(key, _)| (*key).clone())
            .collect();
        if wave.is_empty() {
            break;
        }

        for key in &wave {
            remaining.remove(key);
            for dependent in graph.dependents_of(key) {
                if let Some(degree) = remaining.get_mut(dependent) {
                    *degree -= 1;
                }
            }
        }
        waves.push(wave);
    }

    if !remaining.is_empty() {
        let stuck: BTreeSet<TaskKey> = remaining.keys().map(|key| (*key).clone()).collect();
        let path = find_cycles(graph, &stuck)
            .into_iter()
            .next()
            .unwrap_or_else(|| stuck.into_iter().collect());
        return Err(Error::dependency_cycle(
            path.iter().map(|key| key.to_string()).collect(),
        ));
    }

    Ok(ExecutionPlan { waves })
}

/// Pending tasks whose dependencies are all done, in key order
pub fn next_wave(graph: &DependencyGraph, statuses: &BTreeMap<TaskKey, TaskStatus>) -> Vec<TaskKey> {
    statuses
        .iter()
        .filter(|(_, status)| **status == TaskStatus::Pending)
        .filter(|(key, _)| {
            graph
                .dependencies_of(key)
                .all(|dep| statuses.get(dep) == Some(&TaskStatus::Done))
        })
        .map(|(key, _)| key.clone())
        .collect()
}

/// One concrete cycle per strongly connected component among `among`
///
/// Each path starts and ends at the component's smallest key and follows
/// `before -> after` edges, e.g. `Task/A -> Task/B -> Task/A`. Paths are
/// ordered by their first key.
pub fn find_cycles(graph: &DependencyGraph, among: &BTreeSet<TaskKey>) -> Vec<Vec<TaskKey>> {
    let mut dag: DiGraph<&TaskKey, ()> = DiGraph::new();
    let mut index: BTreeMap<&TaskKey, NodeIndex> = BTreeMap::new();
    for key in among {
        index.insert(key, dag.add_node(key));
    }
    for (before, after) in graph.edges() {
        if let (Some(&from), Some(&to)) = (index.get(&before), index.get(&after)) {
            dag.add_edge(from, to, ());
        }
    }

    let mut cycles: Vec<Vec<TaskKey>> = tarjan_scc(&dag)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&node| dag.contains_edge(node, node))
        })
        .filter_map(|component| cycle_through_smallest(&dag, &component))
        .collect();
    cycles.sort();
    cycles
}

fn cycle_through_smallest(
    dag: &DiGraph<&TaskKey, ()>,
    component: &[NodeIndex],
) -> Option<Vec<TaskKey>> {
    let members: BTreeSet<NodeIndex> = component.iter().copied().collect();
    let start = *component.iter().min_by_key(|&&node| dag[node])?;

    // Breadth-first from `start` inside the component until an edge leads back
    let mut parent: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut next: Vec<NodeIndex> = dag
            .neighbors_directed(node, Direction::Outgoing)
            .filter(|n| members.contains(n))
            .collect();
        next.sort_by_key(|&n| dag[n]);

        for neighbor in next {
            if neighbor == start {
                let mut path = vec![dag[start].clone()];
                let mut cursor = node;
                let mut tail = Vec::new();
                while cursor != start {
                    tail.push(dag[cursor].clone());
                    cursor = *parent.get(&cursor)?;
                }
                tail.reverse();
                path.extend(tail);
                path.push(dag[start].clone());
                return Some(path);
            }
            if !parent.contains_key(&neighbor) {
                parent.insert(neighbor, node);
                queue.push_back(neighbor);
            }
        }
    }
    None
}
