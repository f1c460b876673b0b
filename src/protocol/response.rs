//! Inbound response parsing

use crate::core::error::ProtocolError;
use crate::protocol::{DELIMITER, MISSING_FILENAME, NO_FRONTMATTER_FILENAME};
use serde::Serialize;
use serde_yaml::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// One unit of a model's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSection {
    /// Model-supplied file name, or a placeholder default
    pub filename: String,
    /// Chosen next step; `None` ends this branch
    pub next_step: Option<String>,
    pub content: String,
}

/// How to treat a block whose frontmatter cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Fail the whole response
    Strict,
    /// Give the block a synthetic `section-N.md` name and keep going
    Lenient,
}

/// Running counters, for observability only
#[derive(Debug, Default)]
struct Counters {
    sections_parsed: AtomicU64,
    multi_file_responses: AtomicU64,
    routed_sections: AtomicU64,
}

/// Snapshot of parser counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtocolStats {
    pub sections_parsed: u64,
    pub multi_file_responses: u64,
    pub routed_sections: u64,
}

#[derive(Debug, Default)]
struct Frontmatter {
    filename: Option<String>,
    next_step: Option<String>,
}

/// Parses model responses into sections
#[derive(Debug)]
pub struct ResponseParser {
    mode: ParseMode,
    max_bytes: usize,
    counters: Counters,
}

impl ResponseParser {
    pub fn new(mode: ParseMode, max_bytes: usize) -> Self {
        Self {
            mode,
            max_bytes,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> ProtocolStats {
        ProtocolStats {
            sections_parsed: self.counters.sections_parsed.load(Ordering::Relaxed),
            multi_file_responses: self.counters.multi_file_responses.load(Ordering::Relaxed),
            routed_sections: self.counters.routed_sections.load(Ordering::Relaxed),
        }
    }

    /// Split a response into sections (always at least one)
    pub fn parse(&self, payload: &str) -> Result<Vec<ResponseSection>, ProtocolError> {
        if payload.len() > self.max_bytes {
            return Err(ProtocolError::ResponseTooLarge {
                size: payload.len(),
                max: self.max_bytes,
            });
        }

        let starts_with_block = payload
            .lines()
            .find(|line| !line.trim().is_empty())
            .is_some_and(is_delimiter);

        let sections = if starts_with_block {
            self.parse_blocks(payload)?
        } else {
            vec![ResponseSection {
                filename: NO_FRONTMATTER_FILENAME.to_string(),
                next_step: None,
                content: normalize_content(payload),
            }]
        };

        self.record(&sections);
        debug!(
            "Parsed {} response section(s) from {} bytes",
            sections.len(),
            payload.len()
        );
        Ok(sections)
    }

    fn parse_blocks(&self, payload: &str) -> Result<Vec<ResponseSection>, ProtocolError> {
        // Segments between delimiter lines; the text before the first one is blank
        let mut segments: Vec<Vec<&str>> = Vec::new();
        let mut open = false;
        for line in payload.split('\n') {
            if is_delimiter(line) {
                segments.push(Vec::new());
                open = true;
            } else if open {
                if let Some(segment) = segments.last_mut() {
                    segment.push(line);
                }
            }
        }

        if segments.len() % 2 == 1 {
            return Err(ProtocolError::NoClosingDelimiter {
                section: segments.len() / 2 + 1,
            });
        }

        let mut sections = Vec::with_capacity(segments.len() / 2);
        for (index, pair) in segments.chunks(2).enumerate() {
            let number = index + 1;
            let frontmatter_text = pair[0].join("\n");
            let content = normalize_content(&pair[1].join("\n"));

            let frontmatter = match parse_frontmatter(&frontmatter_text) {
                Ok(frontmatter) => frontmatter,
                Err(reason) => match self.mode {
                    ParseMode::Strict => {
                        return Err(ProtocolError::InvalidFrontmatter {
                            section: number,
                            reason,
                        })
                    }
                    ParseMode::Lenient => {
                        warn!(
                            "Section {} has unreadable frontmatter ({}), using a synthetic name",
                            number, reason
                        );
                        Frontmatter {
                            filename: Some(format!("section-{}.md", number)),
                            next_step: None,
                        }
                    }
                },
            };

            sections.push(ResponseSection {
                filename: frontmatter
                    .filename
                    .unwrap_or_else(|| MISSING_FILENAME.to_string()),
                next_step: frontmatter.next_step,
                content,
            });
        }

        Ok(sections)
    }

    fn record(&self, sections: &[ResponseSection]) {
        self.counters
            .sections_parsed
            .fetch_add(sections.len() as u64, Ordering::Relaxed);
        if sections.len() > 1 {
            self.counters.multi_file_responses.fetch_add(1, Ordering::Relaxed);
        }
        let routed = sections.iter().filter(|s| s.next_step.is_some()).count();
        self.counters
            .routed_sections
            .fetch_add(routed as u64, Ordering::Relaxed);
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Drop one leading blank line and trailing blank lines
fn normalize_content(text: &str) -> String {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.trim_end_matches(['\n', '\r']).to_string()
}

fn parse_frontmatter(text: &str) -> Result<Frontmatter, String> {
    if text.trim().is_empty() {
        return Ok(Frontmatter::default());
    }
    let value: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Frontmatter::default()),
        _ => return Err("frontmatter is not a key/value mapping".to_string()),
    };

    Ok(Frontmatter {
        filename: string_field(&mapping, "filename")?,
        next_step: string_field(&mapping, "nextStep")?,
    })
}

/// A string value, `None` when absent/null/blank, an error for any other type
fn string_field(mapping: &serde_yaml::Mapping, key: &str) -> Result<Option<String>, String> {
    match mapping.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(other) => Err(format!("`{}` must be a string, got {}", key, value_kind(other))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
