//! Outbound request formatting

use crate::protocol::DELIMITER;

/// Fixed text appended to the routing section
pub const ROUTING_INSTRUCTIONS: &str = "\
Choose the one next step that best fits this content from the options above.
Report your choice in the frontmatter of your reply as `nextStep: <step id>`.
If no option applies, leave nextStep out.";

/// What a request section carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Prompt,
    Context,
    Routing,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Input => "input",
            Role::Prompt => "prompt",
            Role::Context => "context",
            Role::Routing => "routing",
        }
    }
}

/// One block of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSection {
    pub role: Role,
    pub filename: Option<String>,
    pub body: String,
}

/// A next step offered to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOption {
    pub step_id: String,
    /// Human-readable condition for picking this step
    pub condition: String,
}

/// Ordered list of request sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolRequest {
    sections: Vec<RequestSection>,
}

impl ProtocolRequest {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, role: Role, filename: Option<String>, body: impl Into<String>) {
        self.sections.push(RequestSection {
            role,
            filename,
            body: body.into(),
        });
    }

    pub fn input(mut self, filename: impl Into<String>, body: impl Into<String>) -> Self {
        self.push(Role::Input, Some(filename.into()), body);
        self
    }

    pub fn prompt(mut self, filename: impl Into<String>, body: impl Into<String>) -> Self {
        self.push(Role::Prompt, Some(filename.into()), body);
        self
    }

    pub fn context(mut self, filename: impl Into<String>, body: impl Into<String>) -> Self {
        self.push(Role::Context, Some(filename.into()), body);
        self
    }

    /// Add the routing block; no-op without options (terminal steps send none)
    pub fn routing(mut self, options: &[RouteOption]) -> Self {
        if options.is_empty() {
            return self;
        }
        let mut body = String::from("Available next steps:\n");
        for option in options {
            body.push_str(&format!("- {}: {}\n", option.step_id, option.condition));
        }
        body.push('\n');
        body.push_str(ROUTING_INSTRUCTIONS);
        self.push(Role::Routing, None, body);
        self
    }

    pub fn sections(&self) -> &[RequestSection] {
        &self.sections
    }

    pub fn has_routing(&self) -> bool {
        self.sections.iter().any(|s| s.role == Role::Routing)
    }

    /// Render the wire form
    pub fn format(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(DELIMITER);
            out.push('\n');
            out.push_str("role: ");
            out.push_str(section.role.as_str());
            out.push('\n');
            if let Some(filename) = &section.filename {
                out.push_str("filename: ");
                out.push_str(filename);
                out.push('\n');
            }
            out.push_str(DELIMITER);
            out.push('\n');
            out.push_str(&section.body);
            out.push('\n');
        }
        out
    }
}
