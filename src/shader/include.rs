//! Recursive `#include` replacement.

use std::collections::BTreeSet;

use crate::logger::Logger;
use crate::shader::file_cache::FileCache;
use crate::shader::file_locator::FileLocator;
use crate::text::scan::{accept_char, accept_str, next_line, skip_whitespace, trim_trailing_whitespace};

/// Replaces `#include` lines with the referenced file contents, recursively.
///
/// Each file is included at most once per call; `already_included` carries
/// the normalized paths that were pulled in, which doubles as the caller's
/// referenced-file list. Unresolvable includes are logged and left in the
/// output verbatim.
pub fn replace_includes(
    parent_path: &str,
    original: &str,
    already_included: &mut BTreeSet<String>,
    locator: &dyn FileLocator,
    cache: &dyn FileCache,
    logger: &dyn Logger,
) -> String {
    let mut result = String::new();
    let mut remaining = original;

    while !remaining.is_empty() {
        let line = next_line(&mut remaining);

        if let Some(reference) = include_reference(line) {
            match locator.find(cache, parent_path, reference) {
                Some(target) => {
                    if already_included.insert(target.clone()) {
                        match cache.content(&target) {
                            Some(content) => {
                                // Expand the included file's own includes first.
                                result.push_str(&replace_includes(
                                    &target,
                                    &content,
                                    already_included,
                                    locator,
                                    cache,
                                    logger,
                                ));
                            }
                            None => {
                                logger.error(&format!("could not read #include'd file: '{target}'"));
                            }
                        }
                    }
                    continue;
                }
                None => {
                    logger.error(&format!("could not locate file to #include: '{reference}'"));
                    // The original #include line stays in the output.
                }
            }
        }

        result.push_str(line);
    }

    result
}

/// The reference text of an `#include` line, `None` for any other line.
fn include_reference(line: &str) -> Option<&str> {
    let mut cursor = line;
    skip_whitespace(&mut cursor);
    if !accept_char(&mut cursor, '#') {
        return None;
    }
    skip_whitespace(&mut cursor);
    if !accept_str(&mut cursor, "include") {
        return None;
    }
    skip_whitespace(&mut cursor);
    Some(trim_trailing_whitespace(cursor))
}
