//! Routing graph validation
//!
//! The step map is plain data; every check here is a pure function over it.
//! An edge `A -> B` exists iff `B` is a non-`default` key of `A`'s routing
//! output.

use crate::core::{
    config::PipelineConfiguration,
    ordered::OrderedMap,
    path,
    step::{is_valid_step_id, OutputSpec, PipelineStep},
};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// A problem that blocks execution
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Invalid step id '{step_id}' (expected a letter followed by letters, digits, '_' or '-')")]
    InvalidStepId { step_id: String },

    #[error("Step '{step_id}' routes to unknown step '{target}'")]
    DanglingReference { step_id: String, target: String },

    #[error("Circular reference: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    #[error("No entry points: every step is the target of another step")]
    NoEntryPoints,

    #[error("Step '{step_id}' is not reachable from any entry point")]
    OrphanedStep { step_id: String },

    #[error("Step '{step_id}' references unknown model '{model}'")]
    UnknownModel { step_id: String, model: String },

    #[error("Step '{step_id}' has an empty routing output (no routes and no default)")]
    EmptyRoutingOutput { step_id: String },

    #[error("Step '{step_id}' has an empty {field} path")]
    EmptyPattern { step_id: String, field: String },

    #[error("Step '{step_id}' {field} template is invalid: {reason}")]
    InvalidTemplate {
        step_id: String,
        field: String,
        reason: String,
    },
}

/// A problem worth reporting that does not block execution
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    #[error("Multiple entry points: {}", .steps.join(", "))]
    MultipleEntryPoints { steps: Vec<String> },

    #[error("Model '{model}' is not used by any step")]
    UnusedModel { model: String },
}

/// Derived view of a configuration; recomputed, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub entry_points: Vec<String>,
    pub orphaned_steps: Vec<String>,
    pub circular_references: Vec<Vec<String>>,
}

impl ValidationResult {
    /// All errors joined for a single-line message
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate a full configuration
pub fn validate(config: &PipelineConfiguration) -> ValidationResult {
    let steps = &config.steps;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (step_id, step) in steps.iter() {
        if !is_valid_step_id(step_id) {
            errors.push(ValidationError::InvalidStepId {
                step_id: step_id.to_string(),
            });
        }
        if !config.models.contains_key(&step.model_config_ref) {
            errors.push(ValidationError::UnknownModel {
                step_id: step_id.to_string(),
                model: step.model_config_ref.clone(),
            });
        }
        check_step_templates(step_id, step, &mut errors);
        for target in step.output_spec.targets() {
            if !steps.contains_key(target) {
                errors.push(ValidationError::DanglingReference {
                    step_id: step_id.to_string(),
                    target: target.to_string(),
                });
            }
        }
    }

    let circular_references = find_cycles(steps);
    for cycle in &circular_references {
        errors.push(ValidationError::CircularReference { cycle: cycle.clone() });
    }

    let entry_points = entry_points(steps);
    if entry_points.is_empty() && !steps.is_empty() {
        errors.push(ValidationError::NoEntryPoints);
    }
    if entry_points.len() > 1 {
        warnings.push(ValidationWarning::MultipleEntryPoints {
            steps: entry_points.clone(),
        });
    }

    let orphaned_steps = orphaned_steps(steps, &entry_points);
    for step_id in &orphaned_steps {
        errors.push(ValidationError::OrphanedStep {
            step_id: step_id.clone(),
        });
    }

    for model in config.models.keys() {
        if !steps.values().any(|s| s.model_config_ref == model) {
            warnings.push(ValidationWarning::UnusedModel {
                model: model.to_string(),
            });
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        entry_points,
        orphaned_steps,
        circular_references,
    }
}

fn check_step_templates(step_id: &str, step: &PipelineStep, errors: &mut Vec<ValidationError>) {
    let mut templates = vec![
        ("input", step.input_pattern.as_str()),
        ("archive", step.archive_pattern.as_str()),
    ];
    match &step.output_spec {
        OutputSpec::Single(template) => templates.push(("output", template.as_str())),
        OutputSpec::Routing(routing) => {
            if routing.is_empty() {
                errors.push(ValidationError::EmptyRoutingOutput {
                    step_id: step_id.to_string(),
                });
            }
            templates.extend(step.output_spec.templates().into_iter().map(|t| ("output", t)));
        }
    }

    for (field, template) in templates {
        if template.trim().is_empty() {
            errors.push(ValidationError::EmptyPattern {
                step_id: step_id.to_string(),
                field: field.to_string(),
            });
            continue;
        }
        if let Err(err) = path::check_template(template) {
            errors.push(ValidationError::InvalidTemplate {
                step_id: step_id.to_string(),
                field: field.to_string(),
                reason: err.to_string(),
            });
        }
    }
}

/// Edges restricted to existing steps, in configuration order
fn adjacency(steps: &OrderedMap<PipelineStep>) -> HashMap<&str, Vec<&str>> {
    steps
        .iter()
        .map(|(id, step)| {
            let targets = step
                .output_spec
                .targets()
                .into_iter()
                .filter(|t| steps.contains_key(t))
                .collect();
            (id, targets)
        })
        .collect()
}

/// Steps never targeted by another step's routing map, in configuration order
pub fn entry_points(steps: &OrderedMap<PipelineStep>) -> Vec<String> {
    let targeted: HashSet<&str> = steps
        .iter()
        .flat_map(|(id, step)| {
            step.output_spec
                .targets()
                .into_iter()
                .filter(move |target| *target != id)
        })
        .collect();

    steps
        .keys()
        .filter(|id| !targeted.contains(id))
        .map(str::to_string)
        .collect()
}

/// Steps unreachable by forward traversal from `entry_points`
pub fn orphaned_steps(steps: &OrderedMap<PipelineStep>, entry_points: &[String]) -> Vec<String> {
    let graph = adjacency(steps);
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = entry_points.iter().map(String::as_str).collect();

    while let Some(id) = queue.pop_front() {
        if !reached.insert(id) {
            continue;
        }
        if let Some(targets) = graph.get(id) {
            queue.extend(targets.iter().copied().filter(|t| !reached.contains(t)));
        }
    }

    steps
        .keys()
        .filter(|id| !reached.contains(id))
        .map(str::to_string)
        .collect()
}

/// Every distinct cycle, each reported as a closed path (`a -> b -> a`)
pub fn find_cycles(steps: &OrderedMap<PipelineStep>) -> Vec<Vec<String>> {
    let graph = adjacency(steps);
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    let mut seen = HashSet::new();
    let mut cycles = Vec::new();

    for id in steps.keys() {
        if !visited.contains(id) {
            dfs_cycles(id, &graph, &mut visited, &mut stack, &mut seen, &mut cycles);
        }
    }

    cycles
}

fn dfs_cycles<'a>(
    id: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    seen: &mut HashSet<Vec<&'a str>>,
    cycles: &mut Vec<Vec<String>>,
) {
    visited.insert(id);
    stack.push(id);

    for &target in graph.get(id).map(Vec::as_slice).unwrap_or_default() {
        if let Some(position) = stack.iter().position(|s| *s == target) {
            let members = &stack[position..];
            if seen.insert(canonical_rotation(members)) {
                let mut cycle: Vec<String> = members.iter().map(|s| s.to_string()).collect();
                cycle.push(target.to_string());
                cycles.push(cycle);
            }
        } else if !visited.contains(target) {
            dfs_cycles(target, graph, visited, stack, seen, cycles);
        }
    }

    stack.pop();
}

/// Rotate so the smallest id comes first; identifies a cycle regardless of start
fn canonical_rotation<'a>(members: &[&'a str]) -> Vec<&'a str> {
    let start = members
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(index, _)| index)
        .unwrap_or(0);
    members[start..].iter().chain(&members[..start]).copied().collect()
}
