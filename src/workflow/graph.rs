//! Dependency graph and level scheduling

use crate::config::{StepDefinition, WorkflowError};
use std::collections::{HashMap, HashSet, VecDeque};

/// Steps grouped into levels that may each run concurrently.
///
/// Every step's dependencies sit in a strictly earlier level. Within a level,
/// indices are in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    levels: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    /// Build the plan for `steps`
    pub fn build(steps: &[StepDefinition]) -> Result<Self, WorkflowError> {
        let index: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();
        let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();

        let mut in_degree = vec![0usize; steps.len()];
        let mut dependents = vec![Vec::new(); steps.len()];

        for (i, step) in steps.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &step.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| WorkflowError::unresolved(&step.name, dep, &names))?;
                if seen.insert(d) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut levels = Vec::new();
        let mut current: Vec<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut scheduled = 0;

        while !current.is_empty() {
            scheduled += current.len();
            let mut next = Vec::new();
            for &i in &current {
                for &dependent in &dependents[i] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            levels.push(std::mem::replace(&mut current, next));
        }

        if scheduled != steps.len() {
            let remaining = (0..steps.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| steps[i].name.clone())
                .collect();
            return Err(WorkflowError::CyclicDependency { steps: remaining });
        }

        Ok(Self { levels, dependents })
    }

    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<Vec<usize>> {
        self.levels
    }

    /// Every step that depends on `step`, directly or not, in declaration order
    pub fn transitive_dependents(&self, step: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependents[step].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if seen.insert(i) {
                queue.extend(self.dependents[i].iter().copied());
            }
        }
        let mut out: Vec<usize> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }
}

/// Group `steps` into dependency levels
pub fn schedule(steps: &[StepDefinition]) -> Result<Vec<Vec<usize>>, WorkflowError> {
    ExecutionPlan::build(steps).map(ExecutionPlan::into_levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, deps: &[&str]) -> StepDefinition {
        StepDefinition::new(name, "true").depends_on(deps.iter().copied())
    }

    fn names(steps: &[StepDefinition], levels: &[Vec<usize>]) -> Vec<Vec<String>> {
        levels
            .iter()
            .map(|l| l.iter().map(|&i| steps[i].name.clone()).collect())
            .collect()
    }

    fn assert_valid_levels(steps: &[StepDefinition], levels: &[Vec<usize>]) {
        let mut level_of = HashMap::new();
        for (l, level) in levels.iter().enumerate() {
            for &i in level {
                assert!(level_of.insert(steps[i].name.as_str(), l).is_none());
            }
        }
        assert_eq!(level_of.len(), steps.len());
        for s in steps {
            for dep in &s.depends_on {
                assert!(
                    level_of[dep.as_str()] < level_of[s.name.as_str()],
                    "{} must come after {}",
                    s.name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_diamond_levels() {
        let steps = vec![
            step("A", &[]),
            step("B", &["A"]),
            step("C", &["A"]),
            step("D", &["B", "C"]),
        ];
        let levels = schedule(&steps).unwrap();
        assert_eq!(names(&steps, &levels), vec![vec!["A"], vec!["B", "C"], vec!["D"]]);
        assert_valid_levels(&steps, &levels);
    }

    #[test]
    fn test_declaration_order_within_level() {
        let steps = vec![
            step("z", &[]),
            step("late", &["z"]),
            step("a", &[]),
            step("early", &["a"]),
        ];
        let levels = schedule(&steps).unwrap();
        assert_eq!(levels, vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_forward_references_and_uneven_depths() {
        let steps = vec![
            step("report", &["test", "lint"]),
            step("test", &["build"]),
            step("lint", &[]),
            step("build", &[]),
        ];
        let levels = schedule(&steps).unwrap();
        assert_eq!(
            names(&steps, &levels),
            vec![vec!["lint", "build"], vec!["test"], vec!["report"]]
        );
        assert_valid_levels(&steps, &levels);
    }

    #[test]
    fn test_empty_and_independent() {
        assert!(schedule(&[]).unwrap().is_empty());
        let steps = vec![step("a", &[]), step("b", &[]), step("c", &[])];
        assert_eq!(schedule(&steps).unwrap(), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_duplicate_dependency_counted_once() {
        let mut b = step("b", &["a"]);
        b.depends_on.push("a".into());
        let steps = vec![step("a", &[]), b];
        assert_eq!(schedule(&steps).unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_unresolved_dependency() {
        let steps = vec![step("build", &[]), step("deploy", &["biuld"])];
        match schedule(&steps) {
            Err(WorkflowError::UnresolvedDependency {
                step,
                dependency,
                suggestion,
            }) => {
                assert_eq!(step, "deploy");
                assert_eq!(dependency, "biuld");
                assert_eq!(suggestion.as_deref(), Some("build"));
            }
            other => panic!("expected UnresolvedDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_two_step_cycle() {
        let steps = vec![step("A", &["B"]), step("B", &["A"])];
        match schedule(&steps) {
            Err(WorkflowError::CyclicDependency { steps }) => assert_eq!(steps, vec!["A", "B"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_remainder_excludes_schedulable_steps() {
        let steps = vec![
            step("root", &[]),
            step("x", &["root", "z"]),
            step("y", &["x"]),
            step("z", &["y"]),
            step("tail", &["z"]),
        ];
        match schedule(&steps) {
            Err(WorkflowError::CyclicDependency { steps }) => {
                assert_eq!(steps, vec!["x", "y", "z", "tail"]);
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let steps = vec![step("loop", &["loop"])];
        assert!(matches!(
            schedule(&steps),
            Err(WorkflowError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_transitive_dependents() {
        let steps = vec![
            step("A", &[]),
            step("B", &["A"]),
            step("C", &["A"]),
            step("D", &["B", "C"]),
            step("E", &[]),
        ];
        let plan = ExecutionPlan::build(&steps).unwrap();
        assert_eq!(plan.transitive_dependents(0), vec![1, 2, 3]);
        assert_eq!(plan.transitive_dependents(1), vec![3]);
        assert!(plan.transitive_dependents(4).is_empty());
        assert_eq!(plan.levels(), &[vec![0, 4], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_wide_random_dag_is_topological() {
        // Layered DAG where step i depends on a fixed pseudo-random subset of earlier steps
        let mut steps = Vec::new();
        for i in 0..40usize {
            let deps: Vec<String> = (0..i)
                .filter(|j| (i * 7 + j * 13) % 5 == 0)
                .map(|j| format!("s{j}"))
                .collect();
            steps.push(StepDefinition::new(format!("s{i}"), "true").depends_on(deps));
        }
        steps.reverse();
        let levels = schedule(&steps).unwrap();
        assert_valid_levels(&steps, &levels);
    }
}
