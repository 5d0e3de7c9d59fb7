// ============================================================
// Layer 4 — Sentence Preprocessor
// ============================================================
// Optional cleaning applied to sentences when `--preprocess`
// is set. Runs AFTER entity marking, because marking relies
// on the original character offsets.
//
// Scraped KLUE sentences often contain:
//   - Non-breaking / zero-width spaces and byte order marks
//   - Curly or full-width quotes next to plain ASCII ones
//   - Runs of spaces and stray control characters
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace and control chars to a space
//   2. Normalise quote variants to ASCII quotes
//   3. Collapse runs of spaces and trim the ends
//
// Reference: Rust Book §8 (Strings in Rust)

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean one sentence. Takes a &str and returns an owned String.
    pub fn clean(&self, text: &str) -> String {
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true; // drops leading spaces

        for c in text.chars() {
            let c = match c {
                '\t' | '\n' | '\r' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' | '\u{3000}' => ' ',
                '\u{2018}' | '\u{2019}' | '\u{FF07}' => '\'',
                '\u{201C}' | '\u{201D}' | '\u{FF02}' => '"',
                c if c.is_control() => ' ',
                c => c,
            };

            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        // At most one trailing space can remain
        if out.ends_with(' ') {
            out.pop();
        }
        out
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("비틀즈가   부른\u{00A0} 노래"), "비틀즈가 부른 노래");
    }

    #[test]
    fn test_trims_edges() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  <S:ORG> 비틀즈 </S:ORG>  "), "<S:ORG> 비틀즈 </S:ORG>");
    }

    #[test]
    fn test_normalises_quotes() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("\u{201C}Abbey Road\u{201D}"), "\"Abbey Road\"");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello\x01world"), "hello world");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
    }
}
