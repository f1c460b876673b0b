//! Frontmatter-delimited text protocol spoken with chat models
//!
//! A request is a sequence of blocks:
//!
//! ```text
//! ---
//! role: input
//! filename: standup.md
//! ---
//! <body>
//! ```
//!
//! A response is one or more blocks carrying optional `filename` and
//! `nextStep` keys, or plain text with no delimiters at all.

pub mod request;
pub mod response;

pub use request::{ProtocolRequest, RequestSection, Role, RouteOption, ROUTING_INSTRUCTIONS};
pub use response::{ParseMode, ProtocolStats, ResponseParser, ResponseSection};

/// Block delimiter line
pub const DELIMITER: &str = "---";

/// Filename for a response that carried no frontmatter at all
pub const NO_FRONTMATTER_FILENAME: &str = "response.md";

/// Filename for a block whose frontmatter has no `filename` key
pub const MISSING_FILENAME: &str = "untitled.md";
