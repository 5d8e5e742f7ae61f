//! Re-encoding substituted text as a correctly typed scalar.

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;
use tracing::debug;

use crate::error::SubstError;
use crate::node::{parse_plain, Scalar};
use crate::subst::is_empty;
use crate::types::SchemaType;

/// Integer or decimal literal, including leading zeros (`007`), trailing
/// dots (`1.`), bare fractions (`.5`), signs and exponents.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][-+]?[0-9]+)?$").unwrap()
});

// YAML 1.1 and earlier uses all sorts of things for booleans
static BOOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(y|Y|yes|Yes|YES|n|N|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF)$",
    )
    .unwrap()
});

static NULL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(null|Null|NULL|~)$").unwrap());

pub fn looks_like_number(text: &str) -> bool {
    NUMBER_RE.is_match(text)
}

pub fn looks_like_bool(text: &str) -> bool {
    BOOL_RE.is_match(text)
}

pub fn looks_like_null(text: &str) -> bool {
    NULL_RE.is_match(text)
}

/// Encode `text` as a scalar of type `inferred`.
///
/// String fields whose text would read back as a number, boolean or null
/// are quoted explicitly. Otherwise the text stays a plain scalar, whose
/// type the YAML resolver infers, as long as reading it back as YAML
/// yields exactly `text` (or the value of a quoted literal such as `"3"`).
/// Text that would not survive that read (comments, padding, line breaks)
/// is kept as a string. So is anything substituted into a block scalar,
/// recognised by `original` spanning lines.
///
/// # Errors
///
/// Returns `SubstError::InvalidScalarOutput` (naming `original`) if single
/// line text parses as a mapping or sequence.
pub fn render(text: &str, inferred: SchemaType, original: &str) -> Result<Scalar, SubstError> {
    if inferred == SchemaType::String
        && (looks_like_number(text) || looks_like_bool(text) || looks_like_null(text))
    {
        return Ok(Scalar::quoted(text));
    }

    if text.contains('\n') || original.contains('\n') {
        // An allowed empty result arrives as the `""` literal.
        let text = if is_empty(text) { "" } else { text };
        return Ok(Scalar::string(text.to_string()));
    }

    match parse_plain(text) {
        Some(Ok(value)) if reads_back_verbatim(text, &value) => Ok(Scalar::plain(text)),
        Some(Ok(_)) => {
            debug!(text, "plain YAML would alter the text, keeping as string");
            Ok(Scalar::quoted(text))
        }
        Some(Err(_)) => Err(SubstError::InvalidScalarOutput {
            text: original.trim_end_matches('\n').to_string(),
        }),
        None => {
            debug!(text, "not valid plain YAML, keeping as string");
            Ok(Scalar::quoted(text))
        }
    }
}

fn reads_back_verbatim(text: &str, value: &Value) -> bool {
    if text != text.trim() {
        return false;
    }
    match value {
        Value::String(s) => s == text || is_quoted_literal(text),
        _ => !text.contains(" #") && !text.contains("\t#"),
    }
}

/// `"..."` or `'...'` with nothing after the closing quote.
fn is_quoted_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let Some((&first, rest)) = bytes.split_first() else {
        return false;
    };
    if !matches!(first, b'"' | b'\'') || rest.last() != Some(&first) {
        return false;
    }
    let inner = &text[1..text.len() - 1];
    !inner.contains(&format!("{} #", first as char))
}
