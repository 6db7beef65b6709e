//! Text normalization for extracted PDF content.
//!
//! Raw extraction output is noisy: page joins introduce line breaks, and
//! some text layers carry literal two-character `\n` escape artifacts from
//! upstream tooling. `normalize` folds all of that into a single
//! space-separated line so content comparison and substring search operate
//! on a canonical form.

/// Clean raw extracted text into its canonical single-line form.
///
/// Passes, in order: collapse runs of literal `\n` escape sequences into a
/// space, collapse runs of real line breaks into a space, strip any stray
/// backslashes, collapse all remaining whitespace runs into single spaces,
/// and trim. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if chars.peek() == Some(&'n') {
                    // Literal "\n" artifact; fold the whole run into one space
                    chars.next();
                    while chars.peek() == Some(&'\\') {
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if lookahead.peek() == Some(&'n') {
                            chars.next();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push(' ');
                }
                // Stray backslash: dropped entirely
            }
            '\n' | '\r' => {
                out.push(' ');
            }
            c => out.push(c),
        }
    }

    // Final collapse catches both pre-existing whitespace runs and the
    // spaces introduced above
    let mut collapsed = String::with_capacity(out.len());
    let mut last_was_space = false;
    for ch in out.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }

    collapsed.trim().to_string()
}
