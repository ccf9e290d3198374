//! Locate `const NAME = {...}` / `const NAME = [...]` declarations and cut out
//! their balanced literal.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::scanner::{CharClass, Scanner};

/// Opening delimiter a declaration is expected to start with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Brace,
    Bracket,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Delimiter::Brace => '{',
            Delimiter::Bracket => '[',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delimiter::Brace => '}',
            Delimiter::Bracket => ']',
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Brace => f.write_str("object literal"),
            Delimiter::Bracket => f.write_str("array literal"),
        }
    }
}

/// Literal text cut out of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted<'a> {
    /// From the opening delimiter through its matching close, or through
    /// end-of-text when the literal never balances
    pub text: &'a str,
    /// Whether depth returned to zero before end-of-text
    pub balanced: bool,
}

/// Extract the object literal assigned to `name`, if declared
pub fn extract_object<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    extract_declaration(text, name, Delimiter::Brace).map(|e| e.text)
}

/// Extract the array literal assigned to `name`, if declared
pub fn extract_array<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    extract_declaration(text, name, Delimiter::Bracket).map(|e| e.text)
}

/// Find the first `const <name> = <open>` in `text` and return the balanced
/// literal that starts at `<open>`.
///
/// Returns `None` when no such declaration exists. A literal that never
/// balances is returned up to end-of-text with `balanced = false`.
pub fn extract_declaration<'a>(
    text: &'a str,
    name: &str,
    delimiter: Delimiter,
) -> Option<Extracted<'a>> {
    let pattern = format!(
        r"const\s+{}\s*=\s*{}",
        regex::escape(name),
        regex::escape(&delimiter.open().to_string())
    );
    let re = Regex::new(&pattern).ok()?;
    let found = re.find(text)?;
    let start = found.end() - delimiter.open().len_utf8();

    match matching_close(&text[start..], delimiter) {
        Some(len) => Some(Extracted {
            text: &text[start..start + len],
            balanced: true,
        }),
        None => {
            log::debug!("{} for {} is not closed before end of text", delimiter, name);
            Some(Extracted {
                text: &text[start..],
                balanced: false,
            })
        }
    }
}

/// Byte length of the balanced region at the start of `text`, whose first
/// character is the opening delimiter. `None` if depth never returns to zero.
fn matching_close(text: &str, delimiter: Delimiter) -> Option<usize> {
    let mut depth = 0usize;
    for item in Scanner::new(text) {
        if item.class != CharClass::Code {
            continue;
        }
        if item.ch == delimiter.open() {
            depth += 1;
        } else if item.ch == delimiter.close() {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(item.pos + item.ch.len_utf8());
            }
        }
    }
    None
}

/// Names of every `const NAME =` declaration in `text`, in source order
pub fn declared_names(text: &str) -> Vec<String> {
    static DECLARATION: OnceLock<Regex> = OnceLock::new();
    let re = DECLARATION.get_or_init(|| {
        Regex::new(r"(?:export\s+)?const\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=")
            .expect("Invalid regex pattern")
    });
    re.captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brace_balance(s: &str) -> (usize, usize) {
        Scanner::new(s)
            .filter(|i| i.class == CharClass::Code)
            .fold((0, 0), |(o, c), i| match i.ch {
                '{' => (o + 1, c),
                '}' => (o, c + 1),
                _ => (o, c),
            })
    }

    #[test]
    fn test_extract_object_simple() {
        let text = "const INITIAL_NODES = { a: { b: 1 } };\nconst X = 1;";
        assert_eq!(
            extract_object(text, "INITIAL_NODES"),
            Some("{ a: { b: 1 } }")
        );
    }

    #[test]
    fn test_extract_array_simple() {
        let text = "export const INITIAL_RELATIONSHIPS = [{from:'a'}, [1, 2]];";
        assert_eq!(
            extract_array(text, "INITIAL_RELATIONSHIPS"),
            Some("[{from:'a'}, [1, 2]]")
        );
    }

    #[test]
    fn test_not_found() {
        let text = "const OTHER = {};";
        assert_eq!(extract_object(text, "INITIAL_NODES"), None);
        assert_eq!(extract_array(text, "OTHER"), None);
        assert_eq!(extract_object("", "INITIAL_NODES"), None);
    }

    #[test]
    fn test_name_must_match_exactly() {
        let text = "const INITIAL_NODES_V2 = { a: 1 };\nconst INITIAL_NODES = { b: 2 };";
        assert_eq!(extract_object(text, "INITIAL_NODES"), Some("{ b: 2 }"));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"const N = { a: "}}}", b: '{', c: `{{`, d: "say \"}\" now" };"#;
        let out = extract_object(text, "N").unwrap();
        assert!(out.starts_with('{'));
        assert!(out.ends_with('}'));
        assert!(out.contains("now"));
        let (open, close) = brace_balance(out);
        assert_eq!(open, close);
    }

    #[test]
    fn test_braces_inside_comments_ignored() {
        let text = "const N = {\n  // it's a } trap\n  a: 1, /* } */\n};";
        assert_eq!(
            extract_object(text, "N"),
            Some("{\n  // it's a } trap\n  a: 1, /* } */\n}")
        );
    }

    #[test]
    fn test_name_regex_metacharacters_escaped() {
        let text = "const A = {x:1}; const A.B = {y:2};";
        assert_eq!(extract_object(text, "A.B"), Some("{y:2}"));
    }

    #[test]
    fn test_unbalanced_runs_to_end() {
        let text = "const N = { a: { b: 1 }";
        let e = extract_declaration(text, "N", Delimiter::Brace).unwrap();
        assert!(!e.balanced);
        assert_eq!(e.text, "{ a: { b: 1 }");
    }

    #[test]
    fn test_unterminated_string_runs_to_end() {
        let text = "const N = { a: `oops }";
        let e = extract_declaration(text, "N", Delimiter::Brace).unwrap();
        assert!(!e.balanced);
        assert_eq!(e.text, "{ a: `oops }");
    }

    #[test]
    fn test_wrong_delimiter_is_not_found() {
        let text = "const N = [1, 2];";
        assert!(extract_declaration(text, "N", Delimiter::Brace).is_none());
    }

    #[test]
    fn test_declared_names() {
        let text = "export const nodes = [];\nconst positions = {};\nlet x = 1;";
        assert_eq!(declared_names(text), vec!["nodes", "positions"]);
    }
}
