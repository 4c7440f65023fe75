use crate::definition::TaskKey;
use serde::Serialize;

/// Up-front wave layering of a task map
///
/// The executor recomputes waves as it goes, since secondary tasks can change
/// the graph mid-run; this plan is what the initial map alone implies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Level 0 has no dependencies; each later level only links earlier ones
    pub waves: Vec<Vec<TaskKey>>,
}

impl ExecutionPlan {
    pub fn task_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    /// Index of the wave holding `key`
    pub fn wave_of(&self, key: &TaskKey) -> Option<usize> {
        self.waves.iter().position(|wave| wave.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}
