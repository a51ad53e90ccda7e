//! Dump line grammar
//!
//! ```text
//! <filename>:  <name>: <value>     header line (metadata, filetype)
//! <filename>:: <line>              content line
//! ```
//!
//! No field ever carries a raw newline: metadata values are collapsed by
//! [`format_metadata`], content is split into lines before formatting.

/// Separator for header lines
pub const HEADER_SEPARATOR: &str = ":  ";

/// Separator for content lines
pub const CONTENT_SEPARATOR: &str = ":: ";

/// Replacement for newlines inside a single-line field
const NEWLINE_REPLACEMENT: &str = "  ";

/// Format `content` as a header line for `filename`.
///
/// # Panics
///
/// If `content` contains a newline.
pub fn format_header(filename: &str, content: &str) -> String {
    assert!(!content.contains('\n'), "header content must be a single line: {:?}", content);
    format!("{}{}{}", filename, HEADER_SEPARATOR, content)
}

/// Format one line of member content.
///
/// # Panics
///
/// If `line` contains a newline.
pub fn format_content(filename: &str, line: &str) -> String {
    assert!(!line.contains('\n'), "content must be a single line: {:?}", line);
    format!("{}{}{}", filename, CONTENT_SEPARATOR, line)
}

/// Render a `(name, value)` pair for inclusion in a header line.
pub fn format_metadata(name: &str, value: &str) -> String {
    format!("{}: {}", join_lines(name), join_lines(value))
}

/// Collapse a possibly multi-line string onto one line.
pub fn join_lines(s: &str) -> String {
    s.replace('\n', NEWLINE_REPLACEMENT)
}
