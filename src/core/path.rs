//! Path template resolution
//!
//! Templates use `{name}` tokens. Exactly four variables exist:
//! `filename`, `stepId`, `timestamp` and `date`. Any other token is an
//! operator typo and fails immediately instead of being left in the path.
//!
//! Vault paths are relative and `/`-separated; the small helpers at the
//! bottom of this module operate on that form.

use crate::core::error::PathError;
use chrono::{DateTime, Local};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// A supported template variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateVariable {
    Filename,
    StepId,
    Timestamp,
    Date,
}

impl TemplateVariable {
    pub const ALL: [TemplateVariable; 4] = [
        TemplateVariable::Filename,
        TemplateVariable::StepId,
        TemplateVariable::Timestamp,
        TemplateVariable::Date,
    ];

    /// Token name as written in templates
    pub fn name(&self) -> &'static str {
        match self {
            TemplateVariable::Filename => "filename",
            TemplateVariable::StepId => "stepId",
            TemplateVariable::Timestamp => "timestamp",
            TemplateVariable::Date => "date",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }
}

/// Values available for substitution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub filename: Option<String>,
    pub step_id: Option<String>,
    pub timestamp: Option<String>,
    pub date: Option<String>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, value: impl Into<String>) -> Self {
        self.filename = Some(value.into());
        self
    }

    pub fn with_step_id(mut self, value: impl Into<String>) -> Self {
        self.step_id = Some(value.into());
        self
    }

    pub fn with_timestamp(mut self, value: impl Into<String>) -> Self {
        self.timestamp = Some(value.into());
        self
    }

    pub fn with_date(mut self, value: impl Into<String>) -> Self {
        self.date = Some(value.into());
        self
    }

    pub fn get(&self, variable: TemplateVariable) -> Option<&str> {
        match variable {
            TemplateVariable::Filename => self.filename.as_deref(),
            TemplateVariable::StepId => self.step_id.as_deref(),
            TemplateVariable::Timestamp => self.timestamp.as_deref(),
            TemplateVariable::Date => self.date.as_deref(),
        }
    }
}

/// Knobs for [`resolve`]
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Run the traversal / absolute / empty checks on the result
    pub validate: bool,
    /// Used for variables that have neither a value nor a synthetic default
    pub fallbacks: HashMap<TemplateVariable, String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            fallbacks: HashMap::new(),
        }
    }
}

impl ResolveOptions {
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn with_fallback(mut self, variable: TemplateVariable, value: impl Into<String>) -> Self {
        self.fallbacks.insert(variable, value.into());
        self
    }
}

/// Outcome of resolving a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub resolved_path: String,
    /// False when any variable had no value; the caller decides if that is fatal
    pub is_complete: bool,
    /// variable name -> substituted value
    pub substitutions: BTreeMap<String, String>,
    /// Names left unresolved, in template order
    pub missing_variables: Vec<String>,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{([^{}\s]+)\}").expect("valid token regex"))
}

/// Path-safe ISO timestamp, e.g. `2024-05-01T09-30-00`
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Day portion, e.g. `2024-05-01`
pub fn format_date(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Expand `{variable}` tokens in `template`
pub fn resolve(
    template: &str,
    values: &TemplateValues,
    options: &ResolveOptions,
) -> Result<ResolvedPath, PathError> {
    let now = Local::now();
    let mut resolved = String::with_capacity(template.len());
    let mut substitutions = BTreeMap::new();
    let mut missing_variables = Vec::new();
    let mut last = 0;

    for captures in token_regex().captures_iter(template) {
        let (Some(token), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let variable = TemplateVariable::from_name(name.as_str()).ok_or_else(|| {
            PathError::UnsupportedVariable {
                name: name.as_str().to_string(),
                template: template.to_string(),
            }
        })?;

        resolved.push_str(&template[last..token.start()]);
        last = token.end();

        let value = values
            .get(variable)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| match variable {
                TemplateVariable::Timestamp => Some(format_timestamp(&now)),
                TemplateVariable::Date => Some(format_date(&now)),
                _ => None,
            })
            .or_else(|| options.fallbacks.get(&variable).cloned());

        match value {
            Some(value) => {
                resolved.push_str(&value);
                substitutions.insert(variable.name().to_string(), value);
            }
            None => {
                resolved.push_str(token.as_str());
                if !missing_variables.iter().any(|m| m == variable.name()) {
                    missing_variables.push(variable.name().to_string());
                }
            }
        }
    }
    resolved.push_str(&template[last..]);

    if options.validate {
        validate_path(&resolved)?;
    }

    Ok(ResolvedPath {
        is_complete: missing_variables.is_empty(),
        resolved_path: resolved,
        substitutions,
        missing_variables,
    })
}

/// Reject empty, absolute and traversing paths
pub fn validate_path(path: &str) -> Result<(), PathError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }
    let bytes = trimmed.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if trimmed.starts_with('/') || trimmed.starts_with('\\') || has_drive {
        return Err(PathError::AbsolutePath(path.to_string()));
    }
    if trimmed.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathError::DirectoryTraversal(path.to_string()));
    }
    Ok(())
}

/// Check a template for unsupported variables without resolving it
pub fn check_template(template: &str) -> Result<Vec<TemplateVariable>, PathError> {
    token_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|name| {
            TemplateVariable::from_name(name.as_str()).ok_or_else(|| {
                PathError::UnsupportedVariable {
                    name: name.as_str().to_string(),
                    template: template.to_string(),
                }
            })
        })
        .collect()
}

/// Last path segment
pub fn basename(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Last path segment without its extension
pub fn stem(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => &name[..index],
    }
}

/// Extension of the last segment, without the dot
pub fn extension(path: &str) -> Option<&str> {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(index) => Some(&name[index + 1..]).filter(|ext| !ext.is_empty()),
    }
}

/// Parent folder (`""` for top-level entries)
pub fn parent(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// `name` with a `-counter` suffix before its extension (`a.md` -> `a-2.md`)
pub fn numbered(name: &str, counter: u32) -> String {
    let stem = stem(name);
    match extension(name) {
        Some(ext) => format!("{}-{}.{}", stem, counter, ext),
        None => format!("{}-{}", stem, counter),
    }
}

/// Join a folder and an entry name
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
