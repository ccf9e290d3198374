//! Rewrite JS object/array literal text into strict JSON.
//!
//! The input is tokenized once on top of the [`Scanner`] classification, so
//! nothing inside a string is ever mistaken for a comment, a key, a comma or
//! a literal token. Emission then applies, token by token:
//!
//! - comments dropped
//! - single- and back-quoted strings re-quoted with `"`, inner `"` escaped
//! - bare identifier / integer keys quoted
//! - trailing commas before `}` / `]` dropped
//! - whitespace-only `{ }` / `[ ]` collapsed
//! - `undefined` and `None` to `null`, `True` / `False` to `true` / `false`

use std::fmt::Write as _;
use std::str::Chars;

use super::scanner::{CharClass, Scanner};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Str(String),
    Word(String),
    Punct(char),
    Space(String),
}

/// Normalize literal text into JSON text.
///
/// Pure and infallible: malformed input produces best-effort output, and the
/// caller's JSON parse reports what is still wrong.
pub fn normalize(text: &str) -> String {
    let tokens = tokenize(text);
    let mut out = String::with_capacity(text.len() + text.len() / 8);

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Str(body) => write_json_string(&mut out, body),
            Token::Word(word) => {
                let before_colon =
                    matches!(next_significant(&tokens, i + 1), Some((_, Token::Punct(':'))));
                if before_colon && is_bare_key(word) {
                    out.push('"');
                    out.push_str(word);
                    out.push('"');
                } else {
                    out.push_str(map_literal(word));
                }
            }
            Token::Punct(',')
                if matches!(
                    next_significant(&tokens, i + 1),
                    Some((_, Token::Punct('}' | ']')))
                ) => {}
            Token::Punct(open @ ('{' | '[')) => {
                let close = if *open == '{' { '}' } else { ']' };
                out.push(*open);
                if let Some((j, Token::Punct(c))) = next_significant(&tokens, i + 1) {
                    if *c == close {
                        out.push(close);
                        i = j;
                    }
                }
            }
            Token::Punct(c) => out.push(*c),
            Token::Space(s) => out.push_str(s),
        }
        i += 1;
    }

    out.trim().to_string()
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut string: Option<String> = None;

    for item in Scanner::new(text) {
        match item.class {
            CharClass::OpenQuote(_) => {
                flush_string(&mut string, &mut tokens);
                string = Some(String::new());
            }
            CharClass::StringBody(_) => {
                if let Some(body) = string.as_mut() {
                    body.push(item.ch);
                }
            }
            CharClass::CloseQuote(_) => flush_string(&mut string, &mut tokens),
            CharClass::Comment => {
                flush_string(&mut string, &mut tokens);
                // keeps words on either side of a comment apart
                if !matches!(tokens.last(), Some(Token::Space(_))) {
                    tokens.push(Token::Space(String::new()));
                }
            }
            CharClass::Code | CharClass::Escaped => {
                flush_string(&mut string, &mut tokens);
                push_code_char(&mut tokens, item.ch);
            }
        }
    }
    // unterminated string at end-of-text closes implicitly
    flush_string(&mut string, &mut tokens);
    tokens
}

fn flush_string(string: &mut Option<String>, tokens: &mut Vec<Token>) {
    if let Some(body) = string.take() {
        tokens.push(Token::Str(body));
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '$' | '.')
}

fn push_code_char(tokens: &mut Vec<Token>, ch: char) {
    if ch.is_whitespace() {
        if let Some(Token::Space(s)) = tokens.last_mut() {
            s.push(ch);
        } else {
            tokens.push(Token::Space(ch.to_string()));
        }
    } else if is_word_char(ch) {
        if let Some(Token::Word(w)) = tokens.last_mut() {
            w.push(ch);
        } else {
            tokens.push(Token::Word(ch.to_string()));
        }
    } else {
        tokens.push(Token::Punct(ch));
    }
}

fn next_significant(tokens: &[Token], from: usize) -> Option<(usize, &Token)> {
    tokens
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, t)| !matches!(t, Token::Space(_)))
}

/// Identifier (`[A-Za-z_$][A-Za-z0-9_$]*`) or decimal integer
fn is_bare_key(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        Some(c) if c.is_ascii_digit() => chars.all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn map_literal(word: &str) -> &str {
    match word {
        "undefined" | "None" => "null",
        "True" => "true",
        "False" => "false",
        other => other,
    }
}

/// Write a string body (as it appeared between its quotes) as a JSON string.
///
/// JSON escapes are kept. JS-only escapes are decoded (`\xHH`, `\u{H..}`,
/// `\0`, `\v`) or, for identity escapes like `\'`, reduced to the escaped
/// character. Bare `"` and control characters are escaped.
fn write_json_string(out: &mut String, body: &str) {
    out.push('"');
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(c @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                    out.push('\\');
                    out.push(c);
                }
                Some('u') => match braced_code_point(&mut chars) {
                    Some(decoded) => push_escaped(out, decoded),
                    None => out.push_str("\\u"),
                },
                // an invalid \x stays invalid so the parse reports it
                Some('x') => match hex_byte(&mut chars) {
                    Some(decoded) => push_escaped(out, decoded),
                    None => out.push_str("\\x"),
                },
                Some('0') => push_escaped(out, '\0'),
                Some('v') => push_escaped(out, '\u{b}'),
                // line continuation
                Some('\n' | '\u{2028}' | '\u{2029}') => {}
                Some('\r') => {
                    if chars.as_str().starts_with('\n') {
                        chars.next();
                    }
                }
                Some(c) => push_escaped(out, c),
                None => out.push_str("\\\\"),
            },
            c => push_escaped(out, c),
        }
    }
    out.push('"');
}

/// `{H..}` after `\u`, consumed only when it names a valid code point
fn braced_code_point(chars: &mut Chars<'_>) -> Option<char> {
    let rest = chars.as_str().strip_prefix('{')?;
    let end = rest.find('}')?;
    let digits = &rest[..end];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = char::from_u32(u32::from_str_radix(digits, 16).ok()?)?;
    *chars = rest[end + 1..].chars();
    Some(decoded)
}

/// Two hex digits after `\x`, consumed only when both are present
fn hex_byte(chars: &mut Chars<'_>) -> Option<char> {
    let rest = chars.as_str();
    let digits = rest.get(..2)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = char::from_u32(u32::from_str_radix(digits, 16).ok()?)?;
    *chars = rest[2..].chars();
    Some(decoded)
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 => {
            let _ = write!(out, "\\u{:04x}", c as u32);
        }
        c => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        let normalized = normalize(text);
        serde_json::from_str(&normalized)
            .unwrap_or_else(|e| panic!("{} did not parse: {}", normalized, e))
    }

    #[test]
    fn test_unquoted_keys() {
        assert_eq!(parse("{a: 1, b_2: 2, $c: 3}"), json!({"a": 1, "b_2": 2, "$c": 3}));
    }

    #[test]
    fn test_numeric_keys() {
        assert_eq!(parse("{1: 'one', 20: 'twenty'}"), json!({"1": "one", "20": "twenty"}));
    }

    #[test]
    fn test_keys_on_own_lines() {
        let text = "{\n  alpha: 1,\n  beta:\n    2\n}";
        assert_eq!(parse(text), json!({"alpha": 1, "beta": 2}));
    }

    #[test]
    fn test_single_quoted_values_and_inner_double_quotes() {
        assert_eq!(
            parse(r#"{a: 'say "hi"', b: ['x', 'y']}"#),
            json!({"a": "say \"hi\"", "b": ["x", "y"]})
        );
    }

    #[test]
    fn test_escaped_apostrophe_in_single_quotes() {
        assert_eq!(parse(r"{a: 'it\'s'}"), json!({"a": "it's"}));
    }

    #[test]
    fn test_apostrophe_inside_double_quotes_untouched() {
        assert_eq!(parse(r#"{label: "it's here"}"#), json!({"label": "it's here"}));
    }

    #[test]
    fn test_backtick_strings() {
        assert_eq!(
            parse("{f: `SUM(x) / COUNT(y)`, g: `two\nlines`}"),
            json!({"f": "SUM(x) / COUNT(y)", "g": "two\nlines"})
        );
    }

    #[test]
    fn test_comments_removed() {
        let text = "{\n  // leading\n  a: 1, // trailing\n  /* block\n  spanning */ b: 2\n}";
        assert_eq!(parse(text), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_comment_marker_inside_string_survives() {
        assert_eq!(
            parse("{url: 'http://x.io', note: \"// not a comment\"}"),
            json!({"url": "http://x.io", "note": "// not a comment"})
        );
    }

    #[test]
    fn test_block_comment_marker_inside_string_survives() {
        assert_eq!(
            parse("{pattern: 'a/*b', rest: 'c*/d'}"),
            json!({"pattern": "a/*b", "rest": "c*/d"})
        );
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(
            parse("{a: [1, 2, ], b: {c: 3, }, }"),
            json!({"a": [1, 2], "b": {"c": 3}})
        );
    }

    #[test]
    fn test_trailing_comma_before_comment_and_close() {
        assert_eq!(parse("[1, 2, // last\n]"), json!([1, 2]));
    }

    #[test]
    fn test_empty_containers_collapsed() {
        assert_eq!(normalize("{ a: [  \n ], b: {\n\n} }"), r#"{ "a": [], "b": {} }"#);
    }

    #[test]
    fn test_literal_tokens() {
        assert_eq!(
            parse("{a: undefined, b: True, c: False, d: None, e: true, f: null}"),
            json!({"a": null, "b": true, "c": false, "d": null, "e": true, "f": null})
        );
        assert_eq!(parse("[undefined, None]"), json!([null, null]));
    }

    #[test]
    fn test_literal_tokens_inside_strings_untouched() {
        assert_eq!(
            parse("{a: 'True story', b: \"None of it\", c: 'undefined'}"),
            json!({"a": "True story", "b": "None of it", "c": "undefined"})
        );
    }

    #[test]
    fn test_numbers_pass_through() {
        assert_eq!(
            parse("{a: -1.5, b: 2e3, c: 10, d: 0.25}"),
            json!({"a": -1.5, "b": 2000.0, "c": 10, "d": 0.25})
        );
    }

    #[test]
    fn test_colon_inside_string_value_not_a_key() {
        assert_eq!(
            parse("{time: '10:30', ratio: \"a: b\"}"),
            json!({"time": "10:30", "ratio": "a: b"})
        );
    }

    #[test]
    fn test_strict_json_is_preserved() {
        let text = r#"{"a": [1, 2.5, "x\"y", "é\n"], "b": {"c": null, "d": false}, "e": "it's"}"#;
        let expected: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parse(text), expected);
    }

    #[test]
    fn test_control_characters_escaped() {
        assert_eq!(parse("{a: 'tab\there'}"), json!({"a": "tab\there"}));
    }

    #[test]
    fn test_unknown_js_escape_resolved() {
        assert_eq!(parse(r"{a: '\d+'}"), json!({"a": "d+"}));
        assert_eq!(parse(r"{a: '\x41\x7a'}"), json!({"a": "Az"}));
        assert_eq!(parse(r"{a: 'a\0b'}"), json!({"a": "a\u{0}b"}));
        assert_eq!(parse(r"{a: 'a\vb'}"), json!({"a": "a\u{b}b"}));
        assert_eq!(parse(r"{a: '\u{1F600} \u{e9}'}"), json!({"a": "\u{1F600} \u{e9}"}));
        assert_eq!(parse(r#"{a: "\u00e9"}"#), json!({"a": "\u{e9}"}));
    }

    #[test]
    fn test_malformed_hex_escape_is_reported() {
        for text in [r"{a: '\xZZ'}", r"{a: '\x4'}", r"{a: '\u{}'}", r"{a: '\u{110000}'}"] {
            assert!(serde_json::from_str::<Value>(&normalize(text)).is_err(), "{}", text);
        }
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(parse("{a: 'one \\\ntwo'}"), json!({"a": "one two"}));
        assert_eq!(parse("{a: 'one \\\r\ntwo'}"), json!({"a": "one two"}));
    }

    #[test]
    fn test_unterminated_string_closes_at_end() {
        assert_eq!(normalize("'abc"), r#""abc""#);
    }

    #[test]
    fn test_deterministic() {
        let text = "{a: 'x', /* c */ b: [1,], }";
        assert_eq!(normalize(text), normalize(text));
    }

    #[test]
    fn test_is_bare_key() {
        assert!(is_bare_key("abc"));
        assert!(is_bare_key("_a1"));
        assert!(is_bare_key("42"));
        assert!(!is_bare_key("4a"));
        assert!(!is_bare_key("1.5"));
        assert!(!is_bare_key(""));
    }
}
