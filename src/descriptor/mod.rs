//! Script metadata header parsing.
//!
//! A runnable script opens with a comment block of fixed-position semantic
//! lines followed by typed parameter declarations:
//!
//! ```text
//! <#
//! Description = "Creates a user account in the directory"
//! Header = "New user"
//! Output = "True"
//! [string]Username = "Account name"
//! [int]ExpiryDays = "Days until the account expires"
//! #>
//! ```
//!
//! Line problems inside the block are collected as diagnostics and parsing
//! continues; only an unopenable file or a block without a terminator is
//! fatal to the selection.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::argument::{ArgTag, ArgumentDefinition};
use crate::error::{DiagnosticKind, EngineError, ParseDiagnostic};

const BLOCK_OPEN: &str = "<#";
const BLOCK_CLOSE: &str = "#>";

/// Parsed metadata for one selected script. Replaced wholesale on
/// re-selection, never mutated.
#[derive(Debug, Clone)]
pub struct ScriptDescriptor {
    pub title: String,
    pub description: String,
    pub produces_output: bool,
    /// In declaration order; keys are unique.
    pub definitions: Vec<Arc<ArgumentDefinition>>,
}

#[derive(Debug, Clone)]
pub struct ParsedDescriptor {
    pub descriptor: ScriptDescriptor,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Reads and parses the leading metadata block of the script at `path`.
pub fn parse_descriptor(path: &Path) -> Result<ParsedDescriptor, EngineError> {
    let text = fs::read_to_string(path).map_err(|e| EngineError::DescriptorUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_header(&text).map_err(|reason| EngineError::DescriptorUnreadable {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parses the header block out of full script text. Returns `Err` only for
/// a missing block or a missing terminator.
pub fn parse_header(text: &str) -> Result<ParsedDescriptor, String> {
    let mut lines = text.lines().enumerate();

    // The block must be the first thing in the file, blank lines aside.
    let opened = lines
        .by_ref()
        .find(|(_, line)| !line.trim().is_empty())
        .filter(|(_, line)| line.trim_start().starts_with(BLOCK_OPEN));
    if opened.is_none() {
        return Err("no metadata block at start of file".into());
    }

    let mut diagnostics = Vec::new();
    let mut description = String::new();
    let mut title = String::new();
    let mut produces_output = false;
    let mut definitions: Vec<Arc<ArgumentDefinition>> = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut terminated = false;
    let mut block_line = 0usize;

    for (idx, raw_line) in lines {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.starts_with(BLOCK_CLOSE) {
            terminated = true;
            break;
        }
        block_line += 1;

        match block_line {
            1 => description = fixed_line_value(line).to_string(),
            2 => title = fixed_line_value(line).to_string(),
            3 => {
                let flag = fixed_line_value(line);
                if flag.eq_ignore_ascii_case("true") {
                    produces_output = true;
                } else if !flag.eq_ignore_ascii_case("false") {
                    diagnostics.push(ParseDiagnostic {
                        line_no,
                        kind: DiagnosticKind::MalformedHeader(format!(
                            "output flag must be \"True\" or \"False\", got \"{flag}\""
                        )),
                    });
                }
            }
            _ => {
                if line.is_empty() {
                    continue;
                }
                match parse_declaration(line) {
                    Ok((tag_token, key, arg_description)) => match tag_token.parse::<ArgTag>() {
                        Ok(tag) => {
                            if !seen_keys.insert(key.to_string()) {
                                diagnostics.push(ParseDiagnostic {
                                    line_no,
                                    kind: DiagnosticKind::DuplicateKey(key.to_string()),
                                });
                                continue;
                            }
                            definitions.push(Arc::new(ArgumentDefinition {
                                key: key.to_string(),
                                description: arg_description.to_string(),
                                tag,
                                ordinal: definitions.len(),
                            }));
                        }
                        Err(tag) => diagnostics.push(ParseDiagnostic {
                            line_no,
                            kind: DiagnosticKind::UnknownArgumentType(tag),
                        }),
                    },
                    Err(msg) => diagnostics.push(ParseDiagnostic {
                        line_no,
                        kind: DiagnosticKind::MalformedHeader(msg),
                    }),
                }
            }
        }
    }

    if !terminated {
        return Err("header block has no terminator".into());
    }

    debug!(
        title = %title,
        definitions = definitions.len(),
        diagnostics = diagnostics.len(),
        "parsed script descriptor"
    );

    Ok(ParsedDescriptor {
        descriptor: ScriptDescriptor {
            title,
            description,
            produces_output,
            definitions,
        },
        diagnostics,
    })
}

/// The three fixed lines tolerate an optional `Name = "value"` wrapping;
/// the bare line is used as-is otherwise.
fn fixed_line_value(line: &str) -> &str {
    match line.split_once('=') {
        Some((_, rest)) => unquote(rest.trim()),
        None => line,
    }
}

/// Splits a `[type]key = "description"` declaration into its three parts.
fn parse_declaration(line: &str) -> Result<(&str, &str, &str), String> {
    let rest = line
        .strip_prefix('[')
        .ok_or_else(|| format!("expected [type]key = \"description\", got \"{line}\""))?;
    let (tag, rest) = rest
        .split_once(']')
        .ok_or_else(|| "declaration is missing ']' after the type tag".to_string())?;
    let (key, description) = rest
        .split_once('=')
        .ok_or_else(|| "declaration is missing '='".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("declaration has an empty key".into());
    }
    Ok((tag.trim(), key, unquote(description.trim())))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<#
Description = "Creates a user account"
Header = "New user"
Output = "True"
[string]Username = "Account name"
[int]ExpiryDays = "Days until expiry"
[checkbox]SendMail = "Notify by mail"
#>
Write-Output "body is opaque"
"#;

    #[test]
    fn parses_full_header() {
        let parsed = parse_header(HEADER).unwrap();
        assert!(parsed.diagnostics.is_empty());

        let d = &parsed.descriptor;
        assert_eq!(d.description, "Creates a user account");
        assert_eq!(d.title, "New user");
        assert!(d.produces_output);
        assert_eq!(d.definitions.len(), 3);
        assert_eq!(d.definitions[0].key, "Username");
        assert_eq!(d.definitions[0].tag, ArgTag::String);
        assert_eq!(d.definitions[1].tag, ArgTag::Int);
        assert_eq!(d.definitions[2].ordinal, 2);
    }

    #[test]
    fn fixed_lines_allow_bare_values() {
        let text = "<#\nplain description\nplain title\nfalse\n#>\n";
        let parsed = parse_header(text).unwrap();
        assert_eq!(parsed.descriptor.description, "plain description");
        assert_eq!(parsed.descriptor.title, "plain title");
        assert!(!parsed.descriptor.produces_output);
    }

    #[test]
    fn unknown_type_is_a_diagnostic_not_an_error() {
        let text = "<#\nd\nt\nFalse\n[weird]X = \"desc\"\n[string]Y = \"kept\"\n#>\n";
        let parsed = parse_header(text).unwrap();
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::UnknownArgumentType("weird".into())
        );
        assert_eq!(parsed.descriptor.definitions.len(), 1);
        assert_eq!(parsed.descriptor.definitions[0].key, "Y");
    }

    #[test]
    fn bad_output_flag_is_a_diagnostic() {
        let text = "<#\nd\nt\nmaybe\n#>\n";
        let parsed = parse_header(text).unwrap();
        assert!(matches!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::MalformedHeader(_)
        ));
        assert!(!parsed.descriptor.produces_output);
    }

    #[test]
    fn duplicate_key_keeps_first_definition() {
        let text =
            "<#\nd\nt\nFalse\n[string]Name = \"first\"\n[int]Name = \"second\"\n#>\n";
        let parsed = parse_header(text).unwrap();
        assert_eq!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::DuplicateKey("Name".into())
        );
        assert_eq!(parsed.descriptor.definitions.len(), 1);
        assert_eq!(parsed.descriptor.definitions[0].tag, ArgTag::String);
    }

    #[test]
    fn missing_terminator_is_fatal() {
        let text = "<#\nd\nt\nTrue\n[string]X = \"desc\"\n";
        assert!(parse_header(text).is_err());
    }

    #[test]
    fn missing_block_is_fatal() {
        assert!(parse_header("Write-Output 'no header'\n").is_err());
    }

    #[test]
    fn malformed_declaration_line_is_a_diagnostic() {
        let text = "<#\nd\nt\nFalse\nnot a declaration\n[string]Ok = \"d\"\n#>\n";
        let parsed = parse_header(text).unwrap();
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.descriptor.definitions.len(), 1);
    }
}
