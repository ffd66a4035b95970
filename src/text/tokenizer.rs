//! Condition-text tokenizer.
//!
//! Produces the flat token stream the expression evaluator and the
//! `[PERMUTATIONS]` parser consume. Tokens borrow the input text.
//!
//! Identifiers follow C rules with one extension: `Foo::Bar::Baz` is a
//! single identifier token, so namespaced enum constants survive as one
//! name. A trailing `::` with no identifier after it is not consumed and
//! produces two separate `NonIdentifier` tokens instead.

use crate::logger::Logger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    /// A single symbol character that is not part of any other token.
    NonIdentifier,
    /// Decimal digits, or `0x`/`0X` followed by hex digits.
    Integer,
    /// `\n` or `\r\n`.
    NewLine,
    /// `//` to the end of the line, terminator excluded.
    LineComment,
    /// `/* ... */`, or to the end of input when unterminated.
    BlockComment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'t> {
    pub kind: TokenKind,
    pub text: &'t str,
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Splits condition text into a token stream.
pub struct Tokenizer<'l> {
    logger: &'l dyn Logger,
}

impl<'l> Tokenizer<'l> {
    pub fn new(logger: &'l dyn Logger) -> Self {
        Self { logger }
    }

    pub fn tokenize<'t>(&self, input: &'t str) -> Vec<Token<'t>> {
        let bytes = input.as_bytes();
        let mut tokens = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let current = bytes[pos];
            let next = bytes.get(pos + 1).copied();

            match current {
                b'/' if next == Some(b'/') => {
                    tokens.push(line_comment(input, &mut pos));
                }
                b'/' if next == Some(b'*') => {
                    tokens.push(self.block_comment(input, &mut pos));
                }
                b' ' | b'\t' => pos += 1,
                b'\n' => {
                    tokens.push(Token {
                        kind: TokenKind::NewLine,
                        text: &input[pos..pos + 1],
                    });
                    pos += 1;
                }
                b'\r' if next == Some(b'\n') => {
                    tokens.push(Token {
                        kind: TokenKind::NewLine,
                        text: &input[pos..pos + 2],
                    });
                    pos += 2;
                }
                b'0'..=b'9' => tokens.push(integer(input, &mut pos)),
                c if is_identifier_start(c) => tokens.push(identifier(input, &mut pos)),
                _ => {
                    // One symbol character per token.
                    let len = input[pos..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(1);
                    tokens.push(Token {
                        kind: TokenKind::NonIdentifier,
                        text: &input[pos..pos + len],
                    });
                    pos += len;
                }
            }
        }

        tokens
    }

    fn block_comment<'t>(&self, input: &'t str, pos: &mut usize) -> Token<'t> {
        let bytes = input.as_bytes();
        let start = *pos;
        *pos += 2;

        while *pos + 1 < bytes.len() {
            if bytes[*pos] == b'*' && bytes[*pos + 1] == b'/' {
                *pos += 2;
                return Token {
                    kind: TokenKind::BlockComment,
                    text: &input[start..*pos],
                };
            }
            *pos += 1;
        }

        *pos = bytes.len();
        self.logger
            .warning(&format!("unclosed block comment: '{}'", &input[start..]));
        Token {
            kind: TokenKind::BlockComment,
            text: &input[start..],
        }
    }
}

fn identifier<'t>(input: &'t str, pos: &mut usize) -> Token<'t> {
    let bytes = input.as_bytes();
    let start = *pos;
    *pos += 1;

    while *pos < bytes.len() {
        if is_identifier_continue(bytes[*pos]) {
            *pos += 1;
            continue;
        }
        // `Name::Name` concatenates into a single identifier; the `::` must
        // be followed by an identifier-start character to be consumed.
        if bytes[*pos] == b':'
            && bytes.get(*pos + 1) == Some(&b':')
            && bytes.get(*pos + 2).copied().is_some_and(is_identifier_start)
        {
            *pos += 3;
            continue;
        }
        break;
    }

    Token {
        kind: TokenKind::Identifier,
        text: &input[start..*pos],
    }
}

fn integer<'t>(input: &'t str, pos: &mut usize) -> Token<'t> {
    let bytes = input.as_bytes();
    let start = *pos;

    let is_hex = bytes[start] == b'0'
        && matches!(bytes.get(start + 1), Some(b'x') | Some(b'X'))
        && bytes.get(start + 2).copied().is_some_and(|b| b.is_ascii_hexdigit());

    if is_hex {
        *pos = start + 3;
        while *pos < bytes.len() && bytes[*pos].is_ascii_hexdigit() {
            *pos += 1;
        }
    } else {
        *pos += 1;
        while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
            *pos += 1;
        }
    }

    Token {
        kind: TokenKind::Integer,
        text: &input[start..*pos],
    }
}

fn line_comment<'t>(input: &'t str, pos: &mut usize) -> Token<'t> {
    let bytes = input.as_bytes();
    let start = *pos;
    *pos += 2;

    while *pos < bytes.len() && bytes[*pos] != b'\n' && bytes[*pos] != b'\r' {
        *pos += 1;
    }

    Token {
        kind: TokenKind::LineComment,
        text: &input[start..*pos],
    }
}

#[cfg(test)]
mod tests {
    use super::{Token, TokenKind, Tokenizer};
    use crate::logger::test_support::CountingLogger;
    use TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let logger = CountingLogger::new();
        Tokenizer::new(&logger)
            .tokenize(input)
            .iter()
            .map(|token| token.kind)
            .collect()
    }

    fn texts<'t>(input: &'t str) -> Vec<&'t str> {
        let logger = CountingLogger::new();
        Tokenizer::new(&logger)
            .tokenize(input)
            .iter()
            .map(|token| token.text)
            .collect::<Vec<_>>()
    }

    // ============================================
    // Token kinds
    // ============================================

    #[test]
    fn single_tokens() {
        assert_eq!(kinds("A"), vec![Identifier]);
        assert_eq!(kinds(":"), vec![NonIdentifier]);
        assert_eq!(kinds("1"), vec![Integer]);
        assert_eq!(kinds("0x10"), vec![Integer]);
        assert_eq!(kinds("0X10"), vec![Integer]);
        assert_eq!(kinds("\n"), vec![NewLine]);
        assert_eq!(kinds("\r\n"), vec![NewLine]);
        assert_eq!(kinds("// line comment"), vec![LineComment]);
        assert_eq!(kinds("/* block comment */"), vec![BlockComment]);
    }

    #[test]
    fn identifier_concatenation() {
        assert_eq!(kinds("A::B"), vec![Identifier]);
        assert_eq!(kinds("A::B::C"), vec![Identifier]);
        assert_eq!(texts("A::B::C"), vec!["A::B::C"]);

        assert_eq!(kinds("A:B"), vec![Identifier, NonIdentifier, Identifier]);
        assert_eq!(kinds("::B"), vec![NonIdentifier, NonIdentifier, Identifier]);
        assert_eq!(kinds("A::"), vec![Identifier, NonIdentifier, NonIdentifier]);
        // A digit cannot start the continuation.
        assert_eq!(
            kinds("A::1"),
            vec![Identifier, NonIdentifier, NonIdentifier, Integer]
        );
    }

    #[test]
    fn whitespace_is_skipped() {
        assert_eq!(
            kinds("A:B:C"),
            vec![Identifier, NonIdentifier, Identifier, NonIdentifier, Identifier]
        );
        assert_eq!(
            kinds(" A:B :C"),
            vec![Identifier, NonIdentifier, Identifier, NonIdentifier, Identifier]
        );
        assert_eq!(
            kinds("A :B:  C  "),
            vec![Identifier, NonIdentifier, Identifier, NonIdentifier, Identifier]
        );
    }

    #[test]
    fn integers() {
        assert_eq!(texts("123 0x1F 0X1f 007"), vec!["123", "0x1F", "0X1f", "007"]);
        // "0x" with no hex digit after it is a zero followed by an
        // identifier.
        assert_eq!(kinds("0x"), vec![Integer, Identifier]);
        assert_eq!(texts("0x"), vec!["0", "x"]);
    }

    #[test]
    fn newline_variants() {
        assert_eq!(kinds("A\nB"), vec![Identifier, NewLine, Identifier]);
        assert_eq!(kinds("A\r\nB"), vec![Identifier, NewLine, Identifier]);
        // A bare carriage return is just a symbol.
        assert_eq!(kinds("A\rB"), vec![Identifier, NonIdentifier, Identifier]);
    }

    #[test]
    fn line_comments_stop_at_line_end() {
        assert_eq!(
            kinds("// one \n // two\n// three"),
            vec![LineComment, NewLine, LineComment, NewLine, LineComment]
        );
        assert_eq!(texts("A// tail"), vec!["A", "// tail"]);
    }

    #[test]
    fn block_comment_encloses_line_comments() {
        assert_eq!(
            kinds("/* Block comment // one \n // two\n// three */"),
            vec![BlockComment]
        );
    }

    #[test]
    fn unterminated_block_comment_warns() {
        let logger = CountingLogger::new();
        let tokens = Tokenizer::new(&logger).tokenize("/* open block comment");
        assert_eq!(
            tokens,
            vec![Token {
                kind: BlockComment,
                text: "/* open block comment"
            }]
        );
        assert_eq!(logger.warning_count(), 1);
    }

    #[test]
    fn expression_stream() {
        assert_eq!(
            texts("(A >= B) && (C > D)"),
            vec!["(", "A", ">", "=", "B", ")", "&", "&", "(", "C", ">", "D", ")"]
        );
    }
}
