//! Recursive-descent evaluator for C-like integer conditions.
//!
//! Evaluates expressions such as `(MSAA_SAMPLES > 1) && !DEPTH_ONLY` against
//! a symbol table. Precedence, tightest first: unary `+ - ~ !`, then `* / %`,
//! `+ -`, `<< >>`, comparisons, `&`, `^`, `|`, `&&`, `||`. Arithmetic is
//! signed 64-bit and the result is truncated to 32 bits on exit.
//!
//! Because the tokenizer emits one symbol per token, multi-character
//! operators are parsed with a two-token peek. The shift level refuses a
//! lone `<`/`>` that is followed by another `<`/`>`, and the bitwise levels
//! refuse `&`/`|` followed by the same symbol, so `a << 1`, `a < b`, `a & b`
//! and `a && b` disambiguate without backtracking.
//!
//! Identifiers other than `true`/`false` are looked up in the value table.
//! In [`Mode::Strict`] an unknown identifier fails the evaluation; in
//! [`Mode::Lenient`] it reads as 0, which is how a text's referenced
//! variables are discovered before any values exist.

use std::collections::{BTreeSet, HashMap};

use crate::logger::Logger;
use crate::text::tokenizer::{Token, TokenKind, Tokenizer};

/// Symbol table for condition evaluation.
pub type ValueTable = HashMap<String, i32>;

/// Accumulates the identifiers an expression referenced.
pub type IdentifierSet = BTreeSet<String>;

/// How unknown identifiers are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Every referenced identifier must be present in the value table.
    #[default]
    Strict,
    /// Unknown identifiers evaluate to 0.
    Lenient,
}

/// Evaluation failed; details are reported through the logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// Strict mode rejects empty expressions.
    EmptyExpression,
    /// Strict mode rejects identifiers missing from the value table.
    UnknownIdentifier,
    /// Division or modulo with a zero divisor.
    DivisionByZero,
    /// Malformed expression, or trailing tokens after it.
    Syntax,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            EvalError::EmptyExpression => "empty expression",
            EvalError::UnknownIdentifier => "identifier has no value",
            EvalError::DivisionByZero => "division by zero",
            EvalError::Syntax => "syntax error",
        };
        f.write_str(message)
    }
}

/// Evaluates condition expressions against a value table.
pub struct Evaluator<'l> {
    logger: &'l dyn Logger,
}

impl<'l> Evaluator<'l> {
    pub fn new(logger: &'l dyn Logger) -> Self {
        Self { logger }
    }

    /// Tokenizes and evaluates `input`.
    ///
    /// When `used` is given, every identifier the expression references
    /// (known or not) is recorded into it.
    pub fn evaluate(
        &self,
        input: &str,
        values: &ValueTable,
        mode: Mode,
        used: Option<&mut IdentifierSet>,
    ) -> Result<i32, EvalError> {
        let tokens = Tokenizer::new(self.logger).tokenize(input);
        self.evaluate_tokens(&tokens, values, mode, used)
    }

    /// Evaluates an already tokenized expression.
    pub fn evaluate_tokens(
        &self,
        tokens: &[Token<'_>],
        values: &ValueTable,
        mode: Mode,
        used: Option<&mut IdentifierSet>,
    ) -> Result<i32, EvalError> {
        let mut parser = Parser {
            tokens,
            pos: 0,
            values,
            mode,
            used,
            logger: self.logger,
        };

        parser.skip_comments();
        let result = if parser.at_end() {
            if mode == Mode::Strict {
                self.logger.error("empty expression");
                return Err(EvalError::EmptyExpression);
            }
            0
        } else {
            parser.parse_or()?
        };

        parser.expect_end_of_line_or_input()?;
        Ok(result as i32)
    }
}

#[derive(Clone, Copy)]
enum Comparison {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

struct Parser<'a, 'l> {
    tokens: &'a [Token<'a>],
    pos: usize,
    values: &'a ValueTable,
    mode: Mode,
    used: Option<&'a mut IdentifierSet>,
    logger: &'l dyn Logger,
}

impl<'a> Parser<'a, '_> {
    fn skip_comments(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if token.kind == TokenKind::LineComment || token.kind == TokenKind::BlockComment {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// The token text an error message should point at.
    fn context_text(&self) -> &str {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        self.tokens.get(index).map(|token| token.text).unwrap_or("")
    }

    fn accept(&mut self, text: &str) -> bool {
        self.skip_comments();
        match self.tokens.get(self.pos) {
            Some(token) if token.text == text => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Accepts two adjacent tokens at once, e.g. `<` `=`.
    fn accept_pair(&mut self, first: &str, second: &str) -> bool {
        self.skip_comments();
        if self.pos + 1 >= self.tokens.len() {
            return false;
        }
        if self.tokens[self.pos].text == first && self.tokens[self.pos + 1].text == second {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    /// Accepts `first` only when the token after it is not `second`.
    fn accept_unless(&mut self, first: &str, second: &str) -> bool {
        self.skip_comments();
        if self.pos + 1 >= self.tokens.len() {
            return false;
        }
        if self.tokens[self.pos].text == first && self.tokens[self.pos + 1].text != second {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn accept_kind(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        self.skip_comments();
        match self.tokens.get(self.pos) {
            Some(&token) if token.kind == kind => {
                self.pos += 1;
                Some(token)
            }
            _ => None,
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), EvalError> {
        if self.accept(text) {
            return Ok(());
        }
        self.logger.error(&format!(
            "expected token '{}' instead of '{}'",
            text,
            self.context_text()
        ));
        Err(EvalError::Syntax)
    }

    fn expect_end_of_line_or_input(&mut self) -> Result<(), EvalError> {
        self.skip_comments();
        if self.at_end() || self.accept_kind(TokenKind::NewLine).is_some() {
            return Ok(());
        }
        self.logger.error(&format!(
            "expected end of line or input instead of token '{}'",
            self.context_text()
        ));
        Err(EvalError::Syntax)
    }

    fn parse_factor(&mut self) -> Result<i64, EvalError> {
        while self.accept("+") {}

        if self.accept("-") {
            return Ok(self.parse_factor()?.wrapping_neg());
        }
        if self.accept("~") {
            return Ok(!self.parse_factor()?);
        }
        if self.accept("!") {
            let value = self.parse_factor()?;
            return Ok(if value != 0 { 0 } else { 1 });
        }

        if let Some(token) = self.accept_kind(TokenKind::Identifier) {
            let value = match token.text {
                "true" => 1,
                "false" => 0,
                name => {
                    if let Some(used) = self.used.as_mut() {
                        used.insert(name.to_string());
                    }
                    match self.values.get(name) {
                        Some(&value) => value as i64,
                        None if self.mode == Mode::Lenient => 0,
                        None => {
                            self.logger.error(&format!(
                                "no value specified for identifier '{name}'"
                            ));
                            return Err(EvalError::UnknownIdentifier);
                        }
                    }
                }
            };
            return Ok(value);
        }

        if let Some(token) = self.accept_kind(TokenKind::Integer) {
            return Ok(parse_integer(token.text));
        }

        if self.accept("(") {
            let value = self.parse_or()?;
            self.expect(")")?;
            return Ok(value);
        }

        self.logger.error(&format!(
            "expected identifier, number, or '(' instead of '{}'",
            self.context_text()
        ));
        Err(EvalError::Syntax)
    }

    fn parse_mul(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_factor()?;
        loop {
            if self.accept("*") {
                result = result.wrapping_mul(self.parse_factor()?);
            } else if self.accept("/") {
                let divisor = self.parse_factor()?;
                if divisor == 0 {
                    self.logger.error("division by zero in condition expression");
                    return Err(EvalError::DivisionByZero);
                }
                result = result.wrapping_div(divisor);
            } else if self.accept("%") {
                let divisor = self.parse_factor()?;
                if divisor == 0 {
                    self.logger.error("modulo by zero in condition expression");
                    return Err(EvalError::DivisionByZero);
                }
                result = result.wrapping_rem(divisor);
            } else {
                return Ok(result);
            }
        }
    }

    fn parse_plus(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_mul()?;
        loop {
            if self.accept("+") {
                result = result.wrapping_add(self.parse_mul()?);
            } else if self.accept("-") {
                result = result.wrapping_sub(self.parse_mul()?);
            } else {
                return Ok(result);
            }
        }
    }

    fn parse_shift(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_plus()?;
        loop {
            if self.accept_pair(">", ">") {
                result = result.wrapping_shr(self.parse_plus()? as u32);
            } else if self.accept_pair("<", "<") {
                result = result.wrapping_shl(self.parse_plus()? as u32);
            } else {
                return Ok(result);
            }
        }
    }

    fn parse_comparison(&mut self) -> Result<i64, EvalError> {
        let lhs = self.parse_shift()?;

        let comparison = if self.accept_pair("=", "=") {
            Comparison::Equal
        } else if self.accept_pair("!", "=") {
            Comparison::NotEqual
        } else if self.accept_pair(">", "=") {
            Comparison::GreaterEqual
        } else if self.accept_pair("<", "=") {
            Comparison::LessEqual
        } else if self.accept_unless(">", ">") {
            Comparison::Greater
        } else if self.accept_unless("<", "<") {
            Comparison::Less
        } else {
            return Ok(lhs);
        };

        let rhs = self.parse_shift()?;
        let holds = match comparison {
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs,
            Comparison::Less => lhs < rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::LessEqual => lhs <= rhs,
            Comparison::GreaterEqual => lhs >= rhs,
        };
        Ok(holds as i64)
    }

    fn parse_bit_and(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_comparison()?;
        while self.accept_unless("&", "&") {
            result &= self.parse_comparison()?;
        }
        Ok(result)
    }

    fn parse_bit_xor(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_bit_and()?;
        while self.accept("^") {
            result ^= self.parse_bit_and()?;
        }
        Ok(result)
    }

    fn parse_bit_or(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_bit_xor()?;
        while self.accept_unless("|", "|") {
            result |= self.parse_bit_xor()?;
        }
        Ok(result)
    }

    fn parse_and(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_bit_or()?;
        while self.accept_pair("&", "&") {
            let rhs = self.parse_bit_or()?;
            result = (result != 0 && rhs != 0) as i64;
        }
        Ok(result)
    }

    fn parse_or(&mut self) -> Result<i64, EvalError> {
        let mut result = self.parse_and()?;
        while self.accept_pair("|", "|") {
            let rhs = self.parse_and()?;
            result = (result != 0 || rhs != 0) as i64;
        }
        Ok(result)
    }
}

fn parse_integer(text: &str) -> i64 {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    // The tokenizer guarantees digits; only absurdly long literals overflow.
    parsed.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{EvalError, Evaluator, IdentifierSet, Mode, ValueTable};
    use crate::logger::test_support::CountingLogger;

    fn value_table() -> ValueTable {
        let mut values = ValueTable::new();
        values.insert("A".to_string(), 1);
        values.insert("B".to_string(), 2);
        values.insert("C".to_string(), -3);
        values.insert("D".to_string(), -4);
        values.insert("value".to_string(), 10);
        values.insert("A1".to_string(), 15);
        values.insert("Foo::Bar".to_string(), 42);
        values
    }

    fn eval(input: &str) -> Result<i32, EvalError> {
        let logger = CountingLogger::new();
        Evaluator::new(&logger).evaluate(input, &value_table(), Mode::Strict, None)
    }

    fn eval_lenient(input: &str) -> Result<i32, EvalError> {
        let logger = CountingLogger::new();
        Evaluator::new(&logger).evaluate(input, &value_table(), Mode::Lenient, None)
    }

    // ============================================
    // Literals and unary operators
    // ============================================

    #[test]
    fn literals() {
        assert_eq!(eval("true"), Ok(1));
        assert_eq!(eval("false"), Ok(0));
        assert_eq!(eval("20"), Ok(20));
        assert_eq!(eval("0x20"), Ok(0x20));
        assert_eq!(eval("0X20"), Ok(0x20));
        assert_eq!(eval("0x010"), Ok(0x10));
        assert_eq!(eval("0xabcde"), Ok(0xabcde));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-2"), Ok(-2));
        assert_eq!(eval("-0x1"), Ok(-1));
        assert_eq!(eval("+2"), Ok(2));
        assert_eq!(eval("++2"), Ok(2));
        assert_eq!(eval("!0"), Ok(1));
        assert_eq!(eval("!7"), Ok(0));
        assert_eq!(eval("~0"), Ok(-1));
        assert_eq!(eval("--2"), Ok(2));
    }

    // ============================================
    // Binary operators and precedence
    // ============================================

    #[test]
    fn arithmetic() {
        assert_eq!(eval("2 + 3 * 4"), Ok(14));
        assert_eq!(eval("(2 + 3) * 4"), Ok(20));
        assert_eq!(eval("7 / 2"), Ok(3));
        assert_eq!(eval("7 % 2"), Ok(1));
        assert_eq!(eval("1 << 4"), Ok(16));
        assert_eq!(eval("256 >> 4"), Ok(16));
    }

    #[test]
    fn bitwise() {
        assert_eq!(eval("0x10 | 0x01"), Ok(0x11));
        assert_eq!(eval("0x7 & 0x13"), Ok(0x7 & 0x13));
        assert_eq!(eval("0x3 ^ 0x5"), Ok(0x6));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("A == B"), Ok(0));
        assert_eq!(eval("A < B"), Ok(1));
        assert_eq!(eval("A>B"), Ok(0));
        assert_eq!(eval("A1 < 20"), Ok(1));
        assert_eq!(eval("C < D"), Ok(0));
        assert_eq!(eval("C >= D"), Ok(1));
        assert_eq!(eval("-20 < D"), Ok(1));
        assert_eq!(eval("-0x10 < D"), Ok(1));
        assert_eq!(eval("0x10 < D"), Ok(0));
    }

    #[test]
    fn logical_operators() {
        assert_eq!(eval("A||B"), Ok(1));
        assert_eq!(eval("(A||B)"), Ok(1));
        assert_eq!(eval("(A<B) || (C<D)"), Ok(1));
        assert_eq!(eval("(A >= B) && (C > D)"), Ok(0));
        // && binds tighter than ||.
        assert_eq!(eval("1 || 0 && 0"), Ok(1));
        assert_eq!(eval("(1 || 0) && 0"), Ok(0));
    }

    // ============================================
    // Identifiers
    // ============================================

    #[test]
    fn identifier_lookup() {
        assert_eq!(eval("value"), Ok(10));
        assert_eq!(eval("Foo::Bar"), Ok(42));
    }

    #[test]
    fn unknown_identifier_strict_vs_lenient() {
        assert_eq!(eval("no_value"), Err(EvalError::UnknownIdentifier));
        assert_eq!(eval_lenient("no_value"), Ok(0));
        assert_eq!(eval_lenient("unset1 || unset2"), Ok(0));
    }

    #[test]
    fn used_identifiers_are_recorded() {
        let logger = CountingLogger::new();
        let mut used = IdentifierSet::new();
        let result = Evaluator::new(&logger).evaluate(
            "(A < unset) || Foo::Bar",
            &value_table(),
            Mode::Lenient,
            Some(&mut used),
        );
        assert_eq!(result, Ok(1));
        assert_eq!(
            used.into_iter().collect::<Vec<_>>(),
            vec!["A".to_string(), "Foo::Bar".to_string(), "unset".to_string()]
        );
    }

    // ============================================
    // Comments and line handling
    // ============================================

    #[test]
    fn comments_are_skipped() {
        assert_eq!(eval("A // line comment"), Ok(1));
        assert_eq!(eval("A /* block comment */"), Ok(1));
        assert_eq!(eval("A /* comment */ || /* more \ncomment */ B"), Ok(1));
        assert_eq!(eval("B // line comment 2 \n // next line"), Ok(2));
    }

    #[test]
    fn expression_ends_at_newline() {
        // Everything after the first newline is ignored.
        assert_eq!(eval("A\nB"), Ok(1));
        // But a partial parse followed by more tokens on the same line fails.
        assert_eq!(eval_lenient("A1B != 2B"), Err(EvalError::Syntax));
        assert_eq!(eval("A B"), Err(EvalError::Syntax));
    }

    #[test]
    fn empty_expression() {
        assert_eq!(eval(""), Err(EvalError::EmptyExpression));
        assert_eq!(eval(" // line comment"), Err(EvalError::EmptyExpression));
        assert_eq!(eval_lenient(""), Ok(0));
    }

    // ============================================
    // Failure cases
    // ============================================

    #[test]
    fn syntax_errors() {
        assert_eq!(eval("Invalid Expression"), Err(EvalError::Syntax));
        assert_eq!(eval("(A"), Err(EvalError::Syntax));
        assert_eq!(eval("*"), Err(EvalError::Syntax));
        assert_eq!(eval("A +"), Err(EvalError::Syntax));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let logger = CountingLogger::new();
        let evaluator = Evaluator::new(&logger);
        assert_eq!(
            evaluator.evaluate("1 / 0", &ValueTable::new(), Mode::Strict, None),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            evaluator.evaluate("1 % 0", &ValueTable::new(), Mode::Strict, None),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(logger.error_count(), 2);
    }

    #[test]
    fn result_truncates_to_32_bits() {
        assert_eq!(eval("1 << 33"), Ok(0));
        assert_eq!(eval("0x7fffffff + 1"), Ok(i32::MIN));
    }
}
