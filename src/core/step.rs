//! Step domain model

use crate::core::ordered::OrderedMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Reserved routing key used when the model picks no (or an unknown) next step
pub const DEFAULT_ROUTE: &str = "default";

fn step_id_regex() -> &'static Regex {
    static STEP_ID: OnceLock<Regex> = OnceLock::new();
    STEP_ID.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid step id regex"))
}

/// Check a step identifier against `^[A-Za-z][A-Za-z0-9_-]*$`
pub fn is_valid_step_id(id: &str) -> bool {
    step_id_regex().is_match(id)
}

/// Output table keyed by next step id, plus an optional fallback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingOutput {
    routes: OrderedMap<String>,
    default: Option<String>,
}

impl RoutingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, next_step: impl Into<String>, template: impl Into<String>) -> Self {
        self.routes.insert(next_step, template.into());
        self
    }

    pub fn with_default(mut self, template: impl Into<String>) -> Self {
        self.default = Some(template.into());
        self
    }

    /// Path template for a given next step
    pub fn route(&self, next_step: &str) -> Option<&str> {
        self.routes.get(next_step).map(String::as_str)
    }

    pub fn default_template(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// `(next step id, template)` pairs in configuration order, `default` excluded
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn next_step_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.keys()
    }

    /// Every key a model answer could land on, `default` included
    pub fn available_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.routes.keys().map(str::to_string).collect();
        if self.default.is_some() {
            keys.push(DEFAULT_ROUTE.to_string());
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.default.is_none()
    }
}

/// Where a step writes its results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOutputSpec", into = "RawOutputSpec")]
pub enum OutputSpec {
    /// One fixed path template
    Single(String),
    /// Template chosen by the model's `nextStep`
    Routing(RoutingOutput),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawOutputSpec {
    Single(String),
    Routing(OrderedMap<String>),
}

impl From<RawOutputSpec> for OutputSpec {
    fn from(raw: RawOutputSpec) -> Self {
        match raw {
            RawOutputSpec::Single(template) => OutputSpec::Single(template),
            RawOutputSpec::Routing(mut map) => {
                let default = map.remove(DEFAULT_ROUTE);
                OutputSpec::Routing(RoutingOutput { routes: map, default })
            }
        }
    }
}

impl From<OutputSpec> for RawOutputSpec {
    fn from(spec: OutputSpec) -> Self {
        match spec {
            OutputSpec::Single(template) => RawOutputSpec::Single(template),
            OutputSpec::Routing(routing) => {
                let mut map = routing.routes;
                if let Some(default) = routing.default {
                    map.insert(DEFAULT_ROUTE, default);
                }
                RawOutputSpec::Routing(map)
            }
        }
    }
}

impl OutputSpec {
    pub fn is_routing(&self) -> bool {
        matches!(self, OutputSpec::Routing(_))
    }

    pub fn routing(&self) -> Option<&RoutingOutput> {
        match self {
            OutputSpec::Routing(routing) => Some(routing),
            OutputSpec::Single(_) => None,
        }
    }

    /// Next step ids this output can route to (the graph edges)
    pub fn targets(&self) -> Vec<&str> {
        match self {
            OutputSpec::Single(_) => Vec::new(),
            OutputSpec::Routing(routing) => routing.next_step_ids().collect(),
        }
    }

    /// Every path template in this output
    pub fn templates(&self) -> Vec<&str> {
        match self {
            OutputSpec::Single(template) => vec![template.as_str()],
            OutputSpec::Routing(routing) => routing
                .routes()
                .map(|(_, template)| template)
                .chain(routing.default_template())
                .collect(),
        }
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineStep {
    /// Key into the configuration's model table
    #[serde(rename = "model")]
    pub model_config_ref: String,

    /// Folder scanned for input files (path template)
    #[serde(rename = "input")]
    pub input_pattern: String,

    /// Output destination(s)
    #[serde(rename = "output")]
    pub output_spec: OutputSpec,

    /// Folder the processed input is moved into (path template)
    #[serde(rename = "archive")]
    pub archive_pattern: String,

    /// Vault files sent as prompt sections
    #[serde(default, rename = "prompts")]
    pub prompt_refs: Vec<String>,

    /// Vault files sent as context sections
    #[serde(default, rename = "context")]
    pub context_refs: Vec<String>,

    /// Human-readable purpose; shown to the model as the routing condition
    #[serde(default)]
    pub description: Option<String>,
}

impl PipelineStep {
    pub fn new(
        model_config_ref: impl Into<String>,
        input_pattern: impl Into<String>,
        output_spec: OutputSpec,
        archive_pattern: impl Into<String>,
    ) -> Self {
        Self {
            model_config_ref: model_config_ref.into(),
            input_pattern: input_pattern.into(),
            output_spec,
            archive_pattern: archive_pattern.into(),
            prompt_refs: Vec::new(),
            context_refs: Vec::new(),
            description: None,
        }
    }

    pub fn with_prompt(mut self, path: impl Into<String>) -> Self {
        self.prompt_refs.push(path.into());
        self
    }

    pub fn with_context(mut self, path: impl Into<String>) -> Self {
        self.context_refs.push(path.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
