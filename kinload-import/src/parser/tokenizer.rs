//! Line tokenizer
//!
//! Turns normalized lines into `LEVEL [XREF] TAG [VALUE]` tokens and folds
//! `CONT` (newline-joined) and `CONC` (directly joined) continuation lines
//! into the value of the token they extend.
//!
//! The tokenizer holds one token back until it knows no further
//! continuation follows. When a bad line arrives while a token is held, the
//! held token is released first and the error on the next call, so errors
//! are always delivered in line order relative to tokens.

use super::{NormalizedLine, ParseError};

/// Levels beyond this are treated as corrupt input
const MAX_LEVEL: u32 = 99;

/// One parsed line (with continuations already joined)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub level: u32,
    /// Record identifier without `@` delimiters (level-0 lines only)
    pub xref: Option<String>,
    /// Upper-cased tag
    pub tag: String,
    pub value: Option<String>,
    pub line_number: u64,
    /// Byte offset of the line in the raw source
    pub offset: u64,
}

impl Token {
    /// Target of a pointer-valued token (`@I1@` → `I1`)
    pub fn pointer(&self) -> Option<&str> {
        self.value.as_deref().and_then(pointer_target)
    }
}

/// Extract the identifier from a pointer value such as `@I42@`
///
/// Calendar escapes (`@#DJULIAN@`) and escaped `@@` sequences are not pointers.
pub fn pointer_target(value: &str) -> Option<&str> {
    let value = value.trim();
    let inner = value.strip_prefix('@')?.strip_suffix('@')?;
    if inner.is_empty() || inner.starts_with('#') || inner.contains('@') {
        return None;
    }
    Some(inner)
}

/// Parse a single normalized line
pub fn tokenize_line(line: &NormalizedLine) -> Result<Token, ParseError> {
    let malformed = || ParseError::MalformedLine {
        line_number: line.line_number,
        content: line.text.clone(),
    };

    let text = line.text.as_str();
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    let level: u32 = text[..digits].parse().map_err(|_| malformed())?;
    if level > MAX_LEVEL {
        return Err(malformed());
    }

    let mut rest = &text[digits..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return Err(malformed());
    }
    rest = rest.trim_start();

    let mut xref = None;
    if let Some(after_at) = rest.strip_prefix('@') {
        let close = after_at.find('@').ok_or_else(malformed)?;
        let id = &after_at[..close];
        let remainder = &after_at[close + 1..];
        if id.is_empty() || !remainder.starts_with(|c: char| c.is_whitespace()) {
            return Err(malformed());
        }
        // Identifiers only open records
        if level != 0 {
            return Err(malformed());
        }
        xref = Some(id.to_owned());
        rest = remainder.trim_start();
    }

    let tag_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if tag.is_empty() {
        return Err(malformed());
    }

    // A single delimiter separates tag and value; further spaces belong to the value
    let mut value_part = &rest[tag_end..];
    if let Some(c) = value_part.chars().next() {
        value_part = &value_part[c.len_utf8()..];
    }
    let value = if value_part.is_empty() {
        None
    } else {
        Some(value_part.replace("@@", "@"))
    };

    Ok(Token {
        level,
        xref,
        tag: tag.to_ascii_uppercase(),
        value,
        line_number: line.line_number,
        offset: line.offset,
    })
}

/// Streaming tokenizer over normalized lines
pub struct Tokenizer<I> {
    lines: I,
    held: Option<Token>,
    stashed: Option<ParseError>,
}

impl<I> Tokenizer<I>
where
    I: Iterator<Item = Result<NormalizedLine, ParseError>>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            held: None,
            stashed: None,
        }
    }

    /// Deliver an error, releasing any held token first
    fn emit_error(&mut self, error: ParseError) -> Result<Token, ParseError> {
        match self.held.take() {
            Some(token) => {
                self.stashed = Some(error);
                Ok(token)
            }
            None => Err(error),
        }
    }
}

impl<I> Iterator for Tokenizer<I>
where
    I: Iterator<Item = Result<NormalizedLine, ParseError>>,
{
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.stashed.take() {
            return Some(Err(error));
        }

        loop {
            let line = match self.lines.next() {
                None => return self.held.take().map(Ok),
                Some(Err(e)) => return Some(self.emit_error(e)),
                Some(Ok(line)) => line,
            };

            let token = match tokenize_line(&line) {
                Ok(token) => token,
                Err(e) => return Some(self.emit_error(e)),
            };

            if token.tag == "CONT" || token.tag == "CONC" {
                match self.held.as_mut() {
                    Some(parent) if token.level == parent.level + 1 => {
                        let joined = parent.value.get_or_insert_with(String::new);
                        if token.tag == "CONT" {
                            joined.push('\n');
                        }
                        if let Some(more) = &token.value {
                            joined.push_str(more);
                        }
                        continue;
                    }
                    _ => {
                        let error = ParseError::UnknownContinuation {
                            line_number: token.line_number,
                            tag: token.tag,
                        };
                        return Some(self.emit_error(error));
                    }
                }
            }

            if let Some(previous) = self.held.replace(token) {
                return Some(Ok(previous));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineNormalizer;

    fn tokens(input: &str) -> Vec<Result<Token, ParseError>> {
        Tokenizer::new(LineNormalizer::new(input.as_bytes())).collect()
    }

    fn line(text: &str) -> NormalizedLine {
        NormalizedLine {
            text: text.to_string(),
            line_number: 7,
            offset: 0,
            next_offset: text.len() as u64,
        }
    }

    #[test]
    fn test_tokenize_record_opening_line() {
        let token = tokenize_line(&line("0 @I42@ indi")).unwrap();
        assert_eq!(token.level, 0);
        assert_eq!(token.xref.as_deref(), Some("I42"));
        assert_eq!(token.tag, "INDI");
        assert_eq!(token.value, None);
    }

    #[test]
    fn test_tokenize_value_keeps_inner_spacing() {
        let token = tokenize_line(&line("2 PLAC Springfield,  Illinois")).unwrap();
        assert_eq!(token.level, 2);
        assert_eq!(token.tag, "PLAC");
        assert_eq!(token.value.as_deref(), Some("Springfield,  Illinois"));
    }

    #[test]
    fn test_tokenize_pointer_value() {
        let token = tokenize_line(&line("1 HUSB @I1@")).unwrap();
        assert_eq!(token.pointer(), Some("I1"));
        assert_eq!(pointer_target("@#DJULIAN@"), None);
        assert_eq!(pointer_target("@@"), None);
        assert_eq!(pointer_target("plain text"), None);
    }

    #[test]
    fn test_tokenize_unescapes_double_at() {
        let token = tokenize_line(&line("1 EMAIL someone@@example.org")).unwrap();
        assert_eq!(token.value.as_deref(), Some("someone@example.org"));
    }

    #[test]
    fn test_tokenize_rejects_bad_lines() {
        for bad in ["1 @I1@ INDI", "0 @@ INDI", "0 @I1 INDI", "100 NAME x", "1 "] {
            assert!(
                matches!(tokenize_line(&line(bad)), Err(ParseError::MalformedLine { .. })),
                "expected {:?} to be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_cont_and_conc_joined() {
        let result = tokens("0 @N1@ NOTE First\n1 CONC  part\n1 CONT Second line\n1 CONT\n0 TRLR\n");
        let note = result[0].as_ref().unwrap();
        assert_eq!(note.value.as_deref(), Some("First part\nSecond line\n"));
        assert_eq!(result[1].as_ref().unwrap().tag, "TRLR");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_continuation_of_valueless_parent() {
        let result = tokens("1 NOTE\n2 CONT text\n");
        assert_eq!(result[0].as_ref().unwrap().value.as_deref(), Some("\ntext"));
    }

    #[test]
    fn test_orphan_continuation_is_error() {
        let result = tokens("1 CONT dangling\n0 HEAD\n");
        assert_eq!(
            result[0],
            Err(ParseError::UnknownContinuation {
                line_number: 1,
                tag: "CONT".to_string()
            })
        );
        assert_eq!(result[1].as_ref().unwrap().tag, "HEAD");
    }

    #[test]
    fn test_continuation_at_wrong_depth_is_error() {
        let result = tokens("0 @N1@ NOTE a\n2 CONT b\n");
        assert_eq!(result[0].as_ref().unwrap().value.as_deref(), Some("a"));
        assert!(matches!(result[1], Err(ParseError::UnknownContinuation { line_number: 2, .. })));
    }

    #[test]
    fn test_errors_delivered_after_held_token() {
        let result = tokens("0 @I1@ INDI\ngarbage\n1 SEX M\n");
        assert_eq!(result[0].as_ref().unwrap().tag, "INDI");
        assert!(matches!(result[1], Err(ParseError::MalformedLine { line_number: 2, .. })));
        assert_eq!(result[2].as_ref().unwrap().tag, "SEX");
    }
}
