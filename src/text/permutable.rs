//! Conditional text blocks driven by permutation variables.
//!
//! A [`PermutableText`] splits its input at directive lines (lines whose
//! first non-whitespace content is `#[`) into an ordered list of pieces:
//!
//! ```text
//! common code            <- Unconditional
//! #[if MSAA_SAMPLES > 1] <- If, condition "MSAA_SAMPLES > 1"
//! resolve code           <- Unconditional
//! #[else]                <- Else
//! passthrough code       <- Unconditional
//! #[endif]               <- Endif
//! ```
//!
//! Rendering walks the pieces with a nested block state machine: the first
//! `if`/`elif` branch whose condition evaluates non-zero is emitted, `else`
//! catches the rest, blocks nest arbitrarily. Directive lines themselves are
//! never emitted.

use std::ops::Range;

use crate::logger::Logger;
use crate::text::evaluator::{EvalError, Evaluator, IdentifierSet, Mode, ValueTable};
use crate::text::scan::{accept_char, accept_str, next_line, skip_whitespace, trim_trailing_whitespace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind {
    /// Plain text, emitted verbatim when its block is taken.
    Unconditional,
    If,
    Elif,
    Else,
    Endif,
}

#[derive(Clone, Debug)]
struct Piece {
    kind: PieceKind,
    /// Byte range into the owned text: the raw slice for unconditional
    /// pieces, the trimmed condition for directives.
    range: Range<usize>,
}

/// Rendering failed; details are reported through the logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// Unmatched or badly nested directives.
    Malformed,
    /// A branch condition failed to evaluate.
    Condition(EvalError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Malformed => write!(f, "malformed directive structure"),
            RenderError::Condition(error) => write!(f, "condition failed: {error}"),
        }
    }
}

/// Text with `#[if]` / `#[elif]` / `#[else]` / `#[endif]` blocks.
#[derive(Clone, Debug, Default)]
pub struct PermutableText {
    text: String,
    pieces: Vec<Piece>,
}

impl PermutableText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `text` and splits it into pieces.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.pieces = parse_pieces(&self.text);
    }

    /// The text as it was set, without any permutation applied.
    pub fn original_text(&self) -> &str {
        &self.text
    }

    /// Renders the text under the given variable assignment.
    pub fn generate_permutation(
        &self,
        variables: &ValueTable,
        logger: &dyn Logger,
    ) -> Result<String, RenderError> {
        let mut output = String::new();
        let mut index = 0;

        while index < self.pieces.len() {
            let before = index;
            self.enter_block(variables, &mut index, &mut output, logger)?;
            if index == before {
                // An elif/else/endif with no enclosing if bounces back here
                // without consuming anything.
                logger.error("unmatched #[elif], #[else], or #[endif]");
                return Err(RenderError::Malformed);
            }
        }

        Ok(output)
    }

    /// Collects the identifiers referenced by any `if`/`elif` condition.
    ///
    /// Discovery is best-effort: conditions are evaluated leniently with an
    /// empty value table, and identifiers accumulate even when a condition
    /// is malformed. The first such failure is still returned so callers can
    /// reject broken text.
    pub fn determine_used_variables(
        &self,
        found: &mut Vec<String>,
        logger: &dyn Logger,
    ) -> Result<(), EvalError> {
        let mut identifiers = IdentifierSet::new();
        let evaluator = Evaluator::new(logger);
        let no_values = ValueTable::new();

        let mut result = Ok(());
        for piece in &self.pieces {
            if matches!(piece.kind, PieceKind::If | PieceKind::Elif) {
                let evaluated = evaluator.evaluate(
                    self.piece_text(piece),
                    &no_values,
                    Mode::Lenient,
                    Some(&mut identifiers),
                );
                if let Err(error) = evaluated {
                    result = result.and(Err(error));
                }
            }
        }

        found.extend(identifiers);
        result
    }

    fn piece_text(&self, piece: &Piece) -> &str {
        &self.text[piece.range.clone()]
    }

    /// Renders pieces until the end of the current block.
    ///
    /// Returns without consuming when it meets an `elif`/`else`/`endif` that
    /// belongs to the parent frame.
    fn enter_block(
        &self,
        variables: &ValueTable,
        index: &mut usize,
        output: &mut String,
        logger: &dyn Logger,
    ) -> Result<(), RenderError> {
        let mut found_if = false;
        let mut taken_branch = false;
        let evaluator = Evaluator::new(logger);

        while *index < self.pieces.len() {
            let piece = &self.pieces[*index];
            match piece.kind {
                PieceKind::Unconditional => {
                    output.push_str(self.piece_text(piece));
                    *index += 1;
                }

                PieceKind::If | PieceKind::Elif => {
                    if piece.kind == PieceKind::If {
                        if found_if {
                            logger.error("nested #[if] without #[endif]");
                            return Err(RenderError::Malformed);
                        }
                        found_if = true;
                        taken_branch = false;
                    } else if !found_if {
                        // The parent frame owns this elif.
                        return Ok(());
                    }

                    let condition = if taken_branch {
                        0
                    } else {
                        evaluator
                            .evaluate(self.piece_text(piece), variables, Mode::Strict, None)
                            .map_err(RenderError::Condition)?
                    };

                    *index += 1;
                    if condition != 0 {
                        taken_branch = true;
                        self.enter_block(variables, index, output, logger)?;
                    } else {
                        self.skip_block(index, logger)?;
                    }
                }

                PieceKind::Else => {
                    if !found_if {
                        return Ok(());
                    }
                    *index += 1;
                    if !taken_branch {
                        self.enter_block(variables, index, output, logger)?;
                    } else {
                        self.skip_block(index, logger)?;
                    }
                }

                PieceKind::Endif => {
                    if !found_if {
                        return Ok(());
                    }
                    *index += 1;
                    found_if = false;
                    taken_branch = false;
                }
            }
        }

        if found_if {
            logger.error("permutable text ends inside an open #[if] block");
            return Err(RenderError::Malformed);
        }
        Ok(())
    }

    /// Advances past a rejected branch, leaving `index` on the sibling
    /// `elif`/`else`/`endif` at nesting depth zero.
    fn skip_block(&self, index: &mut usize, logger: &dyn Logger) -> Result<(), RenderError> {
        let mut nesting = 0u32;

        while *index < self.pieces.len() {
            match self.pieces[*index].kind {
                PieceKind::If => nesting += 1,
                PieceKind::Endif => {
                    if nesting == 0 {
                        return Ok(());
                    }
                    nesting -= 1;
                }
                PieceKind::Elif | PieceKind::Else => {
                    if nesting == 0 {
                        return Ok(());
                    }
                }
                PieceKind::Unconditional => {}
            }
            *index += 1;
        }

        if nesting == 0 {
            return Ok(());
        }
        logger.error("permutable text ends inside a skipped #[if] block");
        Err(RenderError::Malformed)
    }
}

/// Byte offset of `slice` within `parent`. Both must come from the same
/// allocation.
fn offset_in(parent: &str, slice: &str) -> usize {
    slice.as_ptr() as usize - parent.as_ptr() as usize
}

fn parse_pieces(text: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let (unconditional, directive) = next_piece(&mut rest);

        if !unconditional.is_empty() {
            let start = offset_in(text, unconditional);
            pieces.push(Piece {
                kind: PieceKind::Unconditional,
                range: start..start + unconditional.len(),
            });
        }

        if let Some(directive) = directive {
            let (kind, condition) = classify_directive(directive);
            let start = offset_in(text, condition);
            pieces.push(Piece {
                kind,
                range: start..start + condition.len(),
            });
        }
    }

    pieces
}

/// Consumes text up to (and including) the next directive line.
///
/// Returns the unconditional prefix and, when a directive line was found,
/// the line's remainder after `#[`.
fn next_piece<'t>(text: &mut &'t str) -> (&'t str, Option<&'t str>) {
    let piece_start = *text;
    let mut remaining = *text;

    while !remaining.is_empty() {
        let before_line = remaining;
        let mut line = next_line(&mut remaining);

        skip_whitespace(&mut line);
        if accept_char(&mut line, '#') {
            skip_whitespace(&mut line);
            if accept_char(&mut line, '[') {
                let consumed = piece_start.len() - before_line.len();
                *text = remaining;
                return (&piece_start[..consumed], Some(line));
            }
        }
    }

    let all = *text;
    *text = "";
    (all, None)
}

/// Determines a directive's kind and extracts the trimmed condition text.
fn classify_directive(mut line: &str) -> (PieceKind, &str) {
    skip_whitespace(&mut line);

    let mut kind = PieceKind::Unconditional;
    if accept_str(&mut line, "if") {
        kind = PieceKind::If;
    }
    if accept_str(&mut line, "elif") {
        kind = PieceKind::Elif;
    }
    if accept_str(&mut line, "else") {
        kind = PieceKind::Else;
    }
    if accept_str(&mut line, "endif") {
        kind = PieceKind::Endif;
    }

    skip_whitespace(&mut line);
    let mut condition = trim_trailing_whitespace(line);
    // A trailing ']' is expected but tolerated when missing.
    if let Some(stripped) = condition.strip_suffix(']') {
        condition = stripped;
    }
    condition = trim_trailing_whitespace(condition);

    (kind, condition)
}
