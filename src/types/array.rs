//! Parser for the textual array grammar.
//!
//! Literals look like `{1,2,NULL}`, `{{"a","b"},{"c","d"}}` or
//! `[1:2]={1,2}`. String elements may be bare or double-quoted; inside
//! quotes a backslash escapes the next byte. A bare `NULL` is the null
//! element, a quoted `"NULL"` is the four-character string.

use crate::error::{Error, Result};

use super::Value;

/// Decode an array literal, applying `decode_element` to each scalar entry.
pub(crate) fn parse_array(
    input: &str,
    separator: u8,
    decode_element: &dyn Fn(&str) -> Result<Value>,
) -> Result<Vec<Value>> {
    let mut parser = ArrayParser {
        src: input,
        pos: 0,
        separator,
    };

    // An optional dimension header, e.g. "[1:2]=", precedes the braces
    if parser.peek() == Some(b'[') {
        match memchr::memchr(b'=', input.as_bytes()) {
            Some(idx) => parser.pos = idx + 1,
            None => return Err(malformed("dimension header without '='")),
        }
    }

    let values = parser.parse_dimension(decode_element)?;
    if parser.pos != input.len() {
        return Err(malformed("trailing bytes after closing brace"));
    }
    Ok(values)
}

fn malformed(reason: &str) -> Error {
    Error::Decode(format!("Malformed array literal: {reason}"))
}

struct ArrayParser<'a> {
    src: &'a str,
    pos: usize,
    separator: u8,
}

impl<'a> ArrayParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn parse_dimension(
        &mut self,
        decode_element: &dyn Fn(&str) -> Result<Value>,
    ) -> Result<Vec<Value>> {
        if self.bump() != Some(b'{') {
            return Err(malformed("expected '{'"));
        }

        let mut entries = Vec::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(entries);
        }

        loop {
            match self.peek() {
                Some(b'{') => entries.push(Value::Array(self.parse_dimension(decode_element)?)),
                Some(b'"') => {
                    let quoted = self.parse_quoted()?;
                    entries.push(decode_element(&quoted)?);
                }
                Some(_) => {
                    let token = self.parse_bare()?;
                    if token == "NULL" {
                        entries.push(Value::Null);
                    } else {
                        entries.push(decode_element(token)?);
                    }
                }
                None => return Err(malformed("unbalanced braces")),
            }

            match self.bump() {
                Some(b'}') => return Ok(entries),
                Some(byte) if byte == self.separator => continue,
                Some(byte) => {
                    return Err(malformed(&format!(
                        "expected separator or '}}', got '{}'",
                        byte as char
                    )));
                }
                None => return Err(malformed("unbalanced braces")),
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String> {
        self.pos += 1; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some(b'\\') => match self.bump() {
                    Some(escaped) => bytes.push(escaped),
                    None => return Err(malformed("dangling escape")),
                },
                Some(b'"') => break,
                Some(byte) => bytes.push(byte),
                None => return Err(malformed("unterminated quoted element")),
            }
        }
        String::from_utf8(bytes).map_err(|_| malformed("quoted element is not UTF-8"))
    }

    fn parse_bare(&mut self) -> Result<&'a str> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'}') => break,
                Some(byte) if byte == self.separator => break,
                Some(_) => self.pos += 1,
                None => return Err(malformed("unbalanced braces")),
            }
        }
        Ok(&self.src[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(entry: &str) -> Result<Value> {
        Ok(Value::Text(entry.to_string()))
    }

    #[test]
    fn test_bare_and_null_entries() {
        let values = parse_array("{a,NULL,b}", b',', &as_text).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Text("a".into()),
                Value::Null,
                Value::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_null_stays_a_string() {
        let values = parse_array(r#"{"NULL"}"#, b',', &as_text).unwrap();
        assert_eq!(values, vec![Value::Text("NULL".into())]);
    }

    #[test]
    fn test_escapes_inside_quotes() {
        let values = parse_array(r#"{"a\"b","c\\d"}"#, b',', &as_text).unwrap();
        assert_eq!(
            values,
            vec![Value::Text("a\"b".into()), Value::Text("c\\d".into())]
        );
    }

    #[test]
    fn test_nested_dimensions() {
        let values = parse_array("{{a,b},{c,d}}", b',', &as_text).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Array(vec![Value::Text("a".into()), Value::Text("b".into())]),
                Value::Array(vec![Value::Text("c".into()), Value::Text("d".into())]),
            ]
        );
    }

    #[test]
    fn test_dimension_header() {
        let values = parse_array("[1:2]={a,b}", b',', &as_text).unwrap();
        assert_eq!(
            values,
            vec![Value::Text("a".into()), Value::Text("b".into())]
        );
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(parse_array("{}", b',', &as_text).unwrap(), vec![]);
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(parse_array("{a,{b}", b',', &as_text).is_err());
        assert!(parse_array("{a}}", b',', &as_text).is_err());
        assert!(parse_array("{a", b',', &as_text).is_err());
    }
}
