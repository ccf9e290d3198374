//! JS object-literal ingestion: find a named declaration in a data dump,
//! rewrite its literal into strict JSON, and parse it.
//!
//! The pipeline is scanner → extractor → normalizer → `serde_json`. Only the
//! final parse can fail; everything before it degrades gracefully on
//! malformed input.

pub mod extract;
pub mod normalize;
pub mod scanner;

pub use extract::{declared_names, extract_array, extract_declaration, extract_object, Delimiter, Extracted};
pub use normalize::normalize;
pub use scanner::{string_state_at, CharClass, QuoteKind, Scanned, Scanner};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What to do with a declaration whose literal never closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnbalancedPolicy {
    /// Use the text through end-of-input and let the JSON parse decide
    #[default]
    Recover,
    /// Treat the declaration as malformed
    Reject,
}

/// Failure to turn a found declaration into JSON
#[derive(Error, Debug)]
pub enum LiteralError {
    #[error("{name} is not valid after normalization: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{name}: {delimiter} is never closed")]
    Unbalanced { name: String, delimiter: Delimiter },
}

/// Extract, normalize and parse the literal assigned to `name`.
///
/// `Ok(None)` means the declaration does not exist in `text`.
pub fn parse_declaration(
    text: &str,
    name: &str,
    delimiter: Delimiter,
    policy: UnbalancedPolicy,
) -> Result<Option<Value>, LiteralError> {
    let extracted = match extract_declaration(text, name, delimiter) {
        Some(e) => e,
        None => return Ok(None),
    };

    if !extracted.balanced && policy == UnbalancedPolicy::Reject {
        return Err(LiteralError::Unbalanced {
            name: name.to_string(),
            delimiter,
        });
    }

    let json = normalize(extracted.text);
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| LiteralError::Malformed {
            name: name.to_string(),
            source,
        })
}
