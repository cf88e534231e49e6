//! Dependency leveling
//!
//! Partitions plan steps into levels that can run concurrently. Layering is
//! greedy: a step lands in the first level after all of its dependencies have
//! been placed, so redundant edges may produce more levels than strictly
//! necessary. Steps keep their input order within a level.

use crate::error::AgentError;
use crate::models::PlanStep;
use crate::Result;

/// Ordered step indices that share no dependency edge.
pub type DependencyLevel = Vec<usize>;

pub fn group_into_levels(steps: &[PlanStep]) -> Result<Vec<DependencyLevel>> {
    for (index, step) in steps.iter().enumerate() {
        if let Some(bad) = step.depends_on.iter().find(|dep| **dep >= steps.len()) {
            return Err(AgentError::MalformedPlan(format!(
                "step {} depends on step {}, but the plan has only {} steps",
                index,
                bad,
                steps.len()
            )));
        }
    }

    let mut placed = vec![false; steps.len()];
    let mut remaining: Vec<usize> = (0..steps.len()).collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<usize>, Vec<usize>) = remaining
            .iter()
            .copied()
            .partition(|&index| steps[index].depends_on.iter().all(|dep| placed[*dep]));

        // No step became runnable in this scan: what is left depends on itself.
        if ready.is_empty() {
            return Err(AgentError::CyclicPlan { stuck: blocked });
        }

        // Marked only after the scan so a level never sees its own members.
        for index in &ready {
            placed[*index] = true;
        }

        levels.push(ready);
        remaining = blocked;
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(depends_on: &[usize]) -> PlanStep {
        PlanStep::new("tool", json!({})).after(depends_on.iter().copied())
    }

    fn level_of(levels: &[DependencyLevel], index: usize) -> usize {
        levels
            .iter()
            .position(|level| level.contains(&index))
            .unwrap()
    }

    #[test]
    fn test_empty_plan_has_no_levels() {
        assert!(group_into_levels(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_chain_produces_one_level_per_step() {
        let steps = vec![step(&[]), step(&[0])];
        assert_eq!(group_into_levels(&steps).unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_independent_steps_share_a_level_in_input_order() {
        let steps = vec![step(&[]), step(&[]), step(&[]), step(&[0, 2])];
        assert_eq!(
            group_into_levels(&steps).unwrap(),
            vec![vec![0, 1, 2], vec![3]]
        );
    }

    #[test]
    fn test_every_step_placed_once_after_its_dependencies() {
        // Diamond with a redundant edge and out-of-order declaration.
        let steps = vec![
            step(&[3]),
            step(&[]),
            step(&[1]),
            step(&[1, 2]),
            step(&[0, 1]),
            step(&[]),
        ];
        let levels = group_into_levels(&steps).unwrap();

        let mut all: Vec<usize> = levels.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..steps.len()).collect::<Vec<_>>());

        for (index, s) in steps.iter().enumerate() {
            for dep in &s.depends_on {
                assert!(level_of(&levels, *dep) < level_of(&levels, index));
            }
        }

        // Greedy placement: a step sits right after its deepest dependency.
        assert_eq!(levels, vec![vec![1, 5], vec![2], vec![3], vec![0], vec![4]]);
    }

    #[test]
    fn test_two_step_cycle_is_reported() {
        let steps = vec![step(&[1]), step(&[0])];
        match group_into_levels(&steps) {
            Err(AgentError::CyclicPlan { stuck }) => assert_eq!(stuck, vec![0, 1]),
            other => panic!("expected a cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_names_only_unplaceable_steps() {
        // Step 3 waits on the 1 <-> 2 cycle; step 0 is fine.
        let steps = vec![step(&[]), step(&[0, 2]), step(&[1]), step(&[2])];
        match group_into_levels(&steps) {
            Err(AgentError::CyclicPlan { stuck }) => assert_eq!(stuck, vec![1, 2, 3]),
            other => panic!("expected a cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step(&[0])];
        assert!(matches!(
            group_into_levels(&steps),
            Err(AgentError::CyclicPlan { .. })
        ));
    }

    #[test]
    fn test_out_of_range_dependency_is_malformed() {
        let steps = vec![step(&[]), step(&[7])];
        assert!(matches!(
            group_into_levels(&steps),
            Err(AgentError::MalformedPlan(_))
        ));
    }
}
