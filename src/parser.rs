use std::borrow::Cow;
use std::io::Read;

use tracing::trace;

use crate::env::{Environment, ProcessEnv};
use crate::error::{Error, ParseError, ParseErrorKind};
use crate::map::EnvMap;
use crate::model::SubstitutionMode;

/// Parse dotenv text into an ordered map.
///
/// `$NAME` references that the input does not define are looked up in the
/// process environment.
pub fn parse_str(input: &str, substitution_mode: SubstitutionMode) -> Result<EnvMap, Error> {
    parse_str_with_env(input, substitution_mode, &ProcessEnv)
}

/// Parse dotenv text, resolving undefined `$NAME` references through `env`.
pub fn parse_str_with_env<E>(
    input: &str,
    substitution_mode: SubstitutionMode,
    env: &E,
) -> Result<EnvMap, Error>
where
    E: Environment + ?Sized,
{
    let mut map = EnvMap::new();

    for (idx, line) in input.lines().enumerate() {
        if is_ignored_line(line) {
            continue;
        }

        let line_num = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        let (key, value) = parse_line(line, &map, substitution_mode, env)
            .map_err(|kind| ParseError::new(line_num, kind))?;
        trace!(line = line_num, key = %key, "decoded entry");
        map.set(key, value);
    }

    Ok(map)
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8], substitution_mode: SubstitutionMode) -> Result<EnvMap, Error> {
    let text = std::str::from_utf8(input)?;
    parse_str(text, substitution_mode)
}

/// Parse dotenv entries from a reader.
pub fn parse_reader<R: Read>(
    reader: R,
    substitution_mode: SubstitutionMode,
) -> Result<EnvMap, Error> {
    parse_reader_with_env(reader, substitution_mode, &ProcessEnv)
}

/// Parse dotenv entries from a reader, resolving undefined references
/// through `env`.
pub fn parse_reader_with_env<R, E>(
    mut reader: R,
    substitution_mode: SubstitutionMode,
    env: &E,
) -> Result<EnvMap, Error>
where
    R: Read,
    E: Environment + ?Sized,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let text = std::str::from_utf8(&buf)?;
    parse_str_with_env(text, substitution_mode, env)
}

/// Parse dotenv text with variable expansion enabled.
pub fn unmarshal(input: &str) -> Result<EnvMap, Error> {
    parse_str(input, SubstitutionMode::Expand)
}

/// Decode a single `KEY=VALUE` (or `KEY: VALUE`) line.
///
/// `map` holds the entries decoded so far; references to its keys take
/// precedence over `env`. Comment-only lines are not filtered here.
pub fn parse_line<E>(
    line: &str,
    map: &EnvMap,
    substitution_mode: SubstitutionMode,
    env: &E,
) -> Result<(String, String), ParseErrorKind>
where
    E: Environment + ?Sized,
{
    if line.is_empty() {
        return Err(ParseErrorKind::EmptyLine);
    }

    let line = strip_comments(line);
    let (raw_key, raw_value) = split_line(&line)?;
    let key = parse_key(raw_key);
    let value = parse_value(raw_value, map, substitution_mode, env);
    Ok((key.to_owned(), value))
}

fn is_ignored_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Drop `#` comments that are not inside a quoted span.
///
/// Quoting is tracked per `#`-separated segment: a segment with exactly one
/// unescaped `"` or `'` opens or closes a span. Segments with zero or several
/// quotes never change the state, so lines like `A=1 # it's` keep their
/// comment.
fn strip_comments(line: &str) -> Cow<'_, str> {
    if !line.contains('#') {
        return Cow::Borrowed(line);
    }

    let mut quote_open = false;
    let mut kept = Vec::new();
    for segment in line.split('#') {
        if toggles_quote(segment) {
            if quote_open {
                quote_open = false;
                kept.push(segment);
            } else {
                quote_open = true;
            }
        }

        if kept.is_empty() || quote_open {
            kept.push(segment);
        }
    }

    Cow::Owned(kept.join("#"))
}

fn toggles_quote(segment: &str) -> bool {
    count_unescaped(segment, b'"') == 1 || count_unescaped(segment, b'\'') == 1
}

fn count_unescaped(segment: &str, quote: u8) -> usize {
    let bytes = segment.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(idx, byte)| **byte == quote && !is_preceded_by_odd_backslashes(bytes, *idx))
        .count()
}

fn is_preceded_by_odd_backslashes(bytes: &[u8], idx: usize) -> bool {
    let mut cursor = idx;
    let mut backslash_count = 0usize;
    while cursor > 0 && bytes[cursor - 1] == b'\\' {
        cursor -= 1;
        backslash_count += 1;
    }

    backslash_count % 2 == 1
}

/// Split on the first `:` when it comes before any `=` (YAML-style lines),
/// otherwise on the first `=`.
fn split_line(line: &str) -> Result<(&str, &str), ParseErrorKind> {
    let separator = match (line.find(':'), line.find('=')) {
        (Some(colon), Some(equals)) if colon < equals => ':',
        (Some(_), None) => ':',
        _ => '=',
    };

    line.split_once(separator)
        .ok_or(ParseErrorKind::MissingSeparator)
}

/// `export` is removed as a plain prefix, so `exportFOO` becomes `FOO`.
fn parse_key(raw: &str) -> &str {
    let raw = raw.trim_start();
    raw.strip_prefix("export").unwrap_or(raw).trim()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    None,
    Single,
    Double,
}

fn parse_value<E>(raw: &str, map: &EnvMap, substitution_mode: SubstitutionMode, env: &E) -> String
where
    E: Environment + ?Sized,
{
    let value = raw.trim_matches(' ');
    if value.len() <= 1 {
        return value.to_owned();
    }

    let quoting = detect_quoting(value);
    let inner = match quoting {
        Quoting::None => value,
        Quoting::Single | Quoting::Double => &value[1..value.len() - 1],
    };

    let decoded = match quoting {
        Quoting::Single => return inner.to_owned(),
        Quoting::Double => unescape_double_quoted(inner),
        Quoting::None => inner.to_owned(),
    };

    match substitution_mode {
        SubstitutionMode::Expand => expand_variables(&decoded, map, env),
        SubstitutionMode::Disabled => decoded,
    }
}

fn detect_quoting(value: &str) -> Quoting {
    if value.starts_with('\'') && value.ends_with('\'') {
        Quoting::Single
    } else if value.starts_with('"') && value.ends_with('"') {
        Quoting::Double
    } else {
        Quoting::None
    }
}

fn unescape_double_quoted(value: &str) -> String {
    strip_backslashes(&decode_line_breaks(value))
}

/// `\n` and `\r` become real line breaks; every other escape is kept intact.
fn decode_line_breaks(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(next) if next != '\n' => {
                out.push('\\');
                out.push(next);
            }
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }

    out
}

/// Collapse `\X` to `X`, except `\$` which is kept for the expansion pass.
fn strip_backslashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(next) = chars.peek().copied()
            && next != '$'
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(ch);
    }

    out
}

/// A `$NAME`, `${NAME}`, `\$NAME` or `$(...)` occurrence inside a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference {
    escaped: bool,
    subshell: bool,
    name_start: usize,
    name_end: usize,
    end: usize,
}

fn expand_variables<E>(value: &str, map: &EnvMap, env: &E) -> String
where
    E: Environment + ?Sized,
{
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0usize;
    let mut idx = 0usize;

    while idx < bytes.len() {
        let Some(reference) = parse_reference(bytes, idx) else {
            idx += 1;
            continue;
        };

        let token = &value[idx..reference.end];
        let name = &value[reference.name_start..reference.name_end];
        out.push_str(&value[cursor..idx]);

        if reference.escaped || reference.subshell {
            out.push_str(&token[1..]);
        } else if !name.is_empty() {
            match map.get(name) {
                Some((found, _)) => out.push_str(found),
                None => out.push_str(&env.get_var(name).unwrap_or_default()),
            }
        } else {
            out.push_str(token);
        }

        cursor = reference.end;
        idx = reference.end;
    }

    out.push_str(&value[cursor..]);
    out
}

fn parse_reference(bytes: &[u8], start: usize) -> Option<Reference> {
    let mut pos = start;
    let escaped = bytes[pos] == b'\\';
    if escaped {
        pos += 1;
    }
    if bytes.get(pos) != Some(&b'$') {
        return None;
    }
    pos += 1;

    let subshell = bytes.get(pos) == Some(&b'(');
    if subshell {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'{') {
        pos += 1;
    }

    let name_start = pos;
    while pos < bytes.len() && is_name_byte(bytes[pos]) {
        pos += 1;
    }
    let name_end = pos;

    if bytes.get(pos) == Some(&b'}') {
        pos += 1;
    }

    Some(Reference {
        escaped,
        subshell,
        name_start,
        name_end,
        end: pos,
    })
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}
