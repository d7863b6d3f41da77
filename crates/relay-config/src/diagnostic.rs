// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment deserialization errors are converted into miette diagnostics with
//! source spans and "did you mean?" suggestions (Jaro-Winkler similarity).
//! Semantic and routing errors share the same type so startup can report
//! every problem in one pass.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use relay_core::{RelayError, ScopeType};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a key suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(relay::config::unknown_key),
        help("{}", format_unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated valid keys for the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(relay::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(relay::config::missing_key),
        help("add `{key} = <value>` to your relay.toml")
    )]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(relay::config::validation))]
    Validation { message: String },

    /// Two routes claim the same scope for the same chat bot.
    #[error(
        "ambiguous route for chat bot `{chat_bot_id}`: {scope_type} `{scope_id}` is routed to both `{first}` and `{second}`"
    )]
    #[diagnostic(
        code(relay::config::ambiguous_route),
        help("keep exactly one [[routes]] entry per (chat_bot_id, scope_type, scope_id)")
    )]
    AmbiguousRoute {
        chat_bot_id: String,
        scope_type: ScopeType,
        scope_id: String,
        first: String,
        second: String,
    },

    /// A route or default names a bot that is not configured.
    #[error("{location} references unknown {kind} `{id}`")]
    #[diagnostic(
        code(relay::config::unknown_reference),
        help("{}", format_unknown_reference_help(suggestion.as_deref(), kind))
    )]
    UnknownReference {
        /// Where the reference appears, e.g. `routes[2].backend_bot_id`.
        location: String,
        /// `chat bot` or `backend bot`.
        kind: String,
        id: String,
        suggestion: Option<String>,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(relay::config::other))]
    Other(String),
}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

fn format_unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn format_unknown_reference_help(suggestion: Option<&str>, kind: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`?"),
        None => format!("declare the {kind} before routing to it"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let valid_keys: Vec<&str> = expected.to_vec();
                let (span, src) = find_source_span(&error, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, &valid_keys),
                    valid_keys: valid_keys.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: qualified_key(&error.path, field),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.to_string(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn qualified_key(path: &[String], field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", path.join("."))
    }
}

/// Locate the offending key in whichever TOML file the error came from.
fn find_source_span(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let source_path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let source = match source_path {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        // Inline strings carry no file metadata.
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    if let Some((path, content)) = source
        && let Some(offset) = find_key_offset(content, &error.path, field)
    {
        let span = SourceSpan::new(offset.into(), field.len());
        return (Some(span), Some(NamedSource::new(path, content.clone())));
    }

    (None, None)
}

/// Byte offset of `field` in TOML `content`, searched after the first section
/// header named by `path` (`[server]` or `[[backend_bots]]`).
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let search_start = match path.first() {
        None => 0,
        Some(section) => {
            let table = format!("[{section}]");
            let array = format!("[[{section}]]");
            content
                .find(&array)
                .map(|pos| pos + array.len())
                .or_else(|| content.find(&table).map(|pos| pos + table.len()))?
        }
    };

    let mut line_start = search_start;
    for line in content[search_start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(after) = trimmed.strip_prefix(field)
            && (after.starts_with([' ', '=', '\t']))
        {
            return Some(line_start + (line.len() - trimmed.len()));
        }
        line_start += line.len();
    }

    None
}

/// Best candidate above the similarity threshold, if any.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|&key| (key, strsim::jaro_winkler(unknown, key)))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key.to_string())
}

/// Render errors to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let valid = &["bind_address", "port", "base_url", "log_level"];
        assert_eq!(suggest_key("bind_adress", valid), Some("bind_address".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["bind_address", "port"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn finds_key_in_table_section() {
        let content = "[server]\nprot = 1\n";
        let offset = find_key_offset(content, &["server".to_string()], "prot").unwrap();
        assert_eq!(&content[offset..offset + 4], "prot");
    }

    #[test]
    fn finds_key_in_array_section() {
        let content = "[server]\nport = 1\n\n[[backend_bots]]\n  id = \"b\"\n  api_kee = \"x\"\n";
        let offset =
            find_key_offset(content, &["backend_bots".to_string()], "api_kee").unwrap();
        assert_eq!(&content[offset..offset + 7], "api_kee");
    }

    #[test]
    fn ambiguous_route_message_names_both_backends() {
        let err = ConfigError::AmbiguousRoute {
            chat_bot_id: "a".into(),
            scope_type: ScopeType::Channel,
            scope_id: "c1".into(),
            first: "b1".into(),
            second: "b2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("b1") && msg.contains("b2") && msg.contains("channel"));
    }

    #[test]
    fn converts_into_relay_config_error() {
        let err: RelayError = ConfigError::Other("x".into()).into();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
