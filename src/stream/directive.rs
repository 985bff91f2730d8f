//! Inline directive tags: `[name:value]` markers embedded in narrative text.
//!
//! A tag is recognised only for configured names (case-insensitive).  The
//! value is restricted to ASCII letters, digits, `_` and `-`, and is
//! lowercased.  Three shapes are hidden from display:
//!
//! * complete tags: `[pose:happy]` (these also fire),
//! * unterminated tags: `[pose:ha` followed by a non-value character,
//! * a trailing partial marker at the end of the buffer, down to a lone `[`
//!   or `[po`, because it may complete with the next fragment.

use std::fmt;

/// A recognised directive, e.g. `pose = happy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    pub name: String,
    pub value: String,
}

impl Directive {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.name, self.value)
    }
}

/// A complete tag found in a buffer, with its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan {
    pub start: usize,
    pub end: usize,
    pub directive: Directive,
}

/// Result of scanning one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Complete tags in buffer order.
    pub tags: Vec<TagSpan>,
    /// Every byte range to remove from display, in order, non-overlapping.
    pub hidden: Vec<(usize, usize)>,
}

/// The set of directive names to look for.
#[derive(Debug, Clone)]
pub struct DirectiveSyntax {
    names: Vec<String>,
}

impl DirectiveSyntax {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn scan(&self, text: &str) -> Scan {
        let bytes = text.as_bytes();
        let mut scan = Scan::default();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'[' {
                i += 1;
                continue;
            }
            match self.match_at(text, i) {
                Match::Complete { end, directive } => {
                    scan.tags.push(TagSpan {
                        start: i,
                        end,
                        directive,
                    });
                    scan.hidden.push((i, end));
                    i = end;
                }
                Match::Hidden { end } => {
                    scan.hidden.push((i, end));
                    i = end.max(i + 1);
                }
                Match::None => i += 1,
            }
        }
        scan
    }

    /// Display form of `text`: hidden ranges removed, whitespace collapsed
    /// across each removal point, ends trimmed.
    pub fn clean(&self, text: &str) -> String {
        let scan = self.scan(text);
        Self::clean_with(text, &scan)
    }

    pub fn clean_with(text: &str, scan: &Scan) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for &(start, end) in &scan.hidden {
            Self::join(&mut out, &text[cursor..start]);
            cursor = end;
        }
        Self::join(&mut out, &text[cursor..]);
        out.trim().to_owned()
    }

    /// Last complete directive in `text`, if any.
    pub fn last_directive(&self, text: &str) -> Option<Directive> {
        self.scan(text).tags.pop().map(|t| t.directive)
    }

    fn join(out: &mut String, segment: &str) {
        if out.ends_with(char::is_whitespace) {
            out.push_str(segment.trim_start());
        } else {
            out.push_str(segment);
        }
    }

    fn match_at(&self, text: &str, open: usize) -> Match {
        let rest = &text[open + 1..];

        for name in &self.names {
            let head_len = name.len() + 1; // name + ':'
            if rest.len() < head_len {
                // Buffer ends inside the name: hide only if it could still
                // become this directive.
                let lower = rest.to_ascii_lowercase();
                let head = format!("{name}:");
                if head.starts_with(&lower) {
                    return Match::Hidden { end: text.len() };
                }
                continue;
            }
            let head = rest.as_bytes();
            if !head[..name.len()].eq_ignore_ascii_case(name.as_bytes()) || head[name.len()] != b':'
            {
                continue;
            }

            let value_start = open + 1 + head_len;
            let value_len = text[value_start..]
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
                .count();
            let value_end = value_start + value_len;

            if text.as_bytes().get(value_end) == Some(&b']') {
                if value_len == 0 {
                    return Match::Hidden { end: value_end + 1 };
                }
                return Match::Complete {
                    end: value_end + 1,
                    directive: Directive::new(
                        name.clone(),
                        text[value_start..value_end].to_ascii_lowercase(),
                    ),
                };
            }
            return Match::Hidden { end: value_end };
        }
        Match::None
    }
}

enum Match {
    Complete { end: usize, directive: Directive },
    Hidden { end: usize },
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> DirectiveSyntax {
        DirectiveSyntax::new(["pose"])
    }

    #[test]
    fn complete_tag_is_found_and_hidden() {
        let syntax = pose();
        let scan = syntax.scan("Salut [pose:happy] toi");
        assert_eq!(scan.tags.len(), 1);
        assert_eq!(scan.tags[0].directive, Directive::new("pose", "happy"));
        assert_eq!(syntax.clean("Salut [pose:happy] toi"), "Salut toi");
    }

    #[test]
    fn tag_matching_is_case_insensitive_and_value_lowercased() {
        let syntax = pose();
        assert_eq!(
            syntax.last_directive("[POSE:Happy]"),
            Some(Directive::new("pose", "happy"))
        );
    }

    #[test]
    fn trailing_partial_marker_is_hidden() {
        let syntax = pose();
        assert_eq!(syntax.clean("Bonjour [pose:ha"), "Bonjour");
        assert_eq!(syntax.clean("Bonjour [pose:"), "Bonjour");
        assert_eq!(syntax.clean("Bonjour [po"), "Bonjour");
        assert_eq!(syntax.clean("Bonjour ["), "Bonjour");
        assert!(syntax.scan("Bonjour [pose:ha").tags.is_empty());
    }

    #[test]
    fn bracket_text_that_cannot_become_a_tag_stays() {
        let syntax = pose();
        assert_eq!(syntax.clean("voir [1] et [note]"), "voir [1] et [note]");
        assert_eq!(syntax.clean("fin [x"), "fin [x");
    }

    #[test]
    fn unterminated_tag_mid_text_is_hidden_without_firing() {
        let syntax = pose();
        let scan = syntax.scan("a [pose:ha b");
        assert!(scan.tags.is_empty());
        assert_eq!(syntax.clean("a [pose:ha b"), "a b");
    }

    #[test]
    fn empty_value_is_hidden_but_not_a_directive() {
        let syntax = pose();
        assert!(syntax.last_directive("x [pose:] y").is_none());
        assert_eq!(syntax.clean("x [pose:] y"), "x y");
    }

    #[test]
    fn last_directive_wins() {
        let syntax = pose();
        assert_eq!(
            syntax.last_directive("[pose:sad] bon [pose:angry] fin"),
            Some(Directive::new("pose", "angry"))
        );
    }

    #[test]
    fn unconfigured_names_are_plain_text() {
        let syntax = pose();
        assert_eq!(syntax.clean("[emotion:joy] ok"), "[emotion:joy] ok");

        let both = DirectiveSyntax::new(["pose", "emotion"]);
        assert_eq!(both.clean("[emotion:joy] ok"), "ok");
    }

    #[test]
    fn multibyte_text_around_tags() {
        let syntax = pose();
        assert_eq!(syntax.clean("ça [pose:happy] va très bien"), "ça va très bien");
        assert_eq!(syntax.clean("été [pose:é"), "été é");
    }
}
