// Rewrites for caller-supplied SQL text.
//
// Views that use CURRENT_TIMESTAMP would store SQLite's space-separated
// second-precision format; they are rewritten to the canonical ISO form the
// generated SQL writes.

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};
use std::borrow::Cow;
use std::ops::Range;

pub const ISO_NOW: &str = "STRFTIME('%Y-%m-%dT%H:%M:%fZ','NOW')";

/// Rewrite `sql` for the remote dialect. Text that needs no change, or that
/// cannot be tokenized, is returned as given.
pub fn preprocess(sql: &str) -> Cow<'_, str> {
    let dialect = SQLiteDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(_) => return Cow::Borrowed(sql),
    };
    let significant: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_)))
        .collect();

    if !is_view_definition(&significant) {
        return Cow::Borrowed(sql);
    }

    let ranges = current_timestamp_ranges(sql, &significant);
    if ranges.is_empty() {
        return Cow::Borrowed(sql);
    }
    tracing::debug!("Rewriting {} CURRENT_TIMESTAMP call(s) in view definition", ranges.len());

    let mut rewritten = String::with_capacity(sql.len() + ranges.len() * ISO_NOW.len());
    let mut copied = 0;
    for range in ranges {
        rewritten.push_str(&sql[copied..range.start]);
        rewritten.push_str(ISO_NOW);
        copied = range.end;
    }
    rewritten.push_str(&sql[copied..]);
    Cow::Owned(rewritten)
}

fn keyword(token: &TokenWithSpan) -> Option<String> {
    match &token.token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_ascii_uppercase()),
        _ => None,
    }
}

/// `CREATE [TEMP | TEMPORARY] VIEW ...`
fn is_view_definition(tokens: &[&TokenWithSpan]) -> bool {
    let mut words = tokens.iter().map(|t| keyword(t));
    if words.next().flatten().as_deref() != Some("CREATE") {
        return false;
    }
    let mut next = words.next().flatten();
    if matches!(next.as_deref(), Some("TEMP") | Some("TEMPORARY")) {
        next = words.next().flatten();
    }
    next.as_deref() == Some("VIEW")
}

/// Byte ranges of every unquoted `CURRENT_TIMESTAMP`, including an empty
/// argument list that follows it.
fn current_timestamp_ranges(sql: &str, tokens: &[&TokenWithSpan]) -> Vec<Range<usize>> {
    let lines = line_starts(sql);
    let mut ranges = Vec::new();

    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        index += 1;
        if keyword(token).as_deref() != Some("CURRENT_TIMESTAMP") {
            continue;
        }

        let mut end = token.span.end;
        if let [open, close, ..] = &tokens[index..] {
            if open.token == Token::LParen && close.token == Token::RParen {
                end = close.span.end;
                index += 2;
            }
        }

        if let (Some(start), Some(end)) = (
            byte_offset(sql, &lines, token.span.start),
            byte_offset(sql, &lines, end),
        ) {
            ranges.push(start..end);
        }
    }
    ranges
}

fn line_starts(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Tokenizer locations count lines and characters from one.
fn byte_offset(sql: &str, lines: &[usize], location: Location) -> Option<usize> {
    let line_start = *lines.get(usize::try_from(location.line.checked_sub(1)?).ok()?)?;
    let column = usize::try_from(location.column.checked_sub(1)?).ok()?;
    sql[line_start..]
        .char_indices()
        .map(|(i, _)| line_start + i)
        .chain(std::iter::once(sql.len()))
        .nth(column)
}
