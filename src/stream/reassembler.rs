//! Streaming narrative reassembly.
//!
//! Chunks are grouped by `(speaker, correlation)`.  Each chunk re-derives the
//! display text from the whole raw buffer, so the cleaned text is always a
//! function of the raw text.  Directives are applied exactly once per tag
//! occurrence by remembering how far into the raw buffer tags have already
//! fired.

use std::collections::HashMap;

use super::directive::{Directive, DirectiveSyntax};

/// Accumulated raw text of one in-progress utterance.
#[derive(Debug, Default, Clone)]
pub struct StreamBuffer {
    raw: String,
    /// Byte offset in `raw` up to which directives have been applied.
    applied_until: usize,
}

impl StreamBuffer {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A directive that fired on this chunk, together with the display text
/// that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveHit {
    pub directive: Directive,
    pub display_before: String,
}

/// What a chunk changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpdate {
    pub speaker: String,
    pub correlation: String,
    /// Newly completed tags, in buffer order.
    pub directives: Vec<DirectiveHit>,
    /// Full display text after this chunk.
    pub display: String,
}

/// A finalized narrative message, ready to become a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub message_id: Option<String>,
    pub speaker: String,
    pub display_text: String,
    /// Last complete directive in the final text.
    pub directive: Option<Directive>,
}

/// Reassembles chunked narrative text per `(speaker, correlation)`.
pub struct Reassembler {
    syntax: DirectiveSyntax,
    buffers: HashMap<(String, String), StreamBuffer>,
}

impl Reassembler {
    pub fn new(syntax: DirectiveSyntax) -> Self {
        Self {
            syntax,
            buffers: HashMap::new(),
        }
    }

    pub fn syntax(&self) -> &DirectiveSyntax {
        &self.syntax
    }

    /// Append `fragment` to the buffer for `(speaker, correlation)`.
    ///
    /// Chunks without a correlation id cannot be grouped and are dropped.
    /// A new correlation for a speaker supersedes that speaker's older buffer.
    pub fn on_chunk(
        &mut self,
        speaker: &str,
        correlation: Option<&str>,
        fragment: &str,
    ) -> Option<ChunkUpdate> {
        let Some(correlation) = correlation else {
            log::warn!("stream: dropping chunk from {speaker} without correlation id");
            return None;
        };

        self.buffers.retain(|(s, c), _| {
            let superseded = s == speaker && c != correlation;
            if superseded {
                log::debug!("stream: {speaker}/{c} superseded by {correlation}");
            }
            !superseded
        });

        let buffer = self
            .buffers
            .entry((speaker.to_owned(), correlation.to_owned()))
            .or_default();
        buffer.raw.push_str(fragment);

        let scan = self.syntax.scan(&buffer.raw);
        let mut directives = Vec::new();
        let applied = buffer.applied_until;
        for tag in scan.tags.iter().filter(|t| t.start >= applied) {
            directives.push(DirectiveHit {
                directive: tag.directive.clone(),
                display_before: self.syntax.clean(&buffer.raw[..tag.start]),
            });
            buffer.applied_until = tag.end;
        }

        let display = DirectiveSyntax::clean_with(&buffer.raw, &scan);

        Some(ChunkUpdate {
            speaker: speaker.to_owned(),
            correlation: correlation.to_owned(),
            directives,
            display,
        })
    }

    /// Close the stream for `(speaker, correlation)` and turn the full text
    /// into an utterance.
    pub fn on_final(
        &mut self,
        speaker: &str,
        correlation: Option<&str>,
        message_id: Option<&str>,
        full_text: &str,
    ) -> Utterance {
        if let Some(correlation) = correlation {
            if self
                .buffers
                .remove(&(speaker.to_owned(), correlation.to_owned()))
                .is_some()
            {
                log::debug!("stream: closed {speaker}/{correlation}");
            }
        }

        let scan = self.syntax.scan(full_text);
        Utterance {
            message_id: message_id.map(str::to_owned),
            speaker: speaker.to_owned(),
            display_text: DirectiveSyntax::clean_with(full_text, &scan),
            directive: scan.tags.last().map(|t| t.directive.clone()),
        }
    }

    /// Drop every open stream (e.g. after the transport went away).
    pub fn clear(&mut self) {
        if !self.buffers.is_empty() {
            log::debug!("stream: discarding {} open stream(s)", self.buffers.len());
        }
        self.buffers.clear();
    }

    pub fn open_streams(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer(&self, speaker: &str, correlation: &str) -> Option<&StreamBuffer> {
        self.buffers
            .get(&(speaker.to_owned(), correlation.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassembler() -> Reassembler {
        Reassembler::new(DirectiveSyntax::new(["pose"]))
    }

    fn happy() -> Directive {
        Directive::new("pose", "happy")
    }

    #[test]
    fn progressive_display_with_split_directive() {
        let mut r = reassembler();

        let u1 = r.on_chunk("A", Some("c1"), "Bonjour [pose:ha").unwrap();
        assert_eq!(u1.display, "Bonjour");
        assert!(u1.directives.is_empty());

        let u2 = r.on_chunk("A", Some("c1"), "ppy] comment").unwrap();
        assert_eq!(
            u2.directives,
            vec![DirectiveHit {
                directive: happy(),
                display_before: "Bonjour".into(),
            }]
        );
        assert_eq!(u2.display, "Bonjour comment");

        let u3 = r.on_chunk("A", Some("c1"), " ça va").unwrap();
        assert!(u3.directives.is_empty(), "happy must not refire");
        assert_eq!(u3.display, "Bonjour comment ça va");
    }

    #[test]
    fn repeated_identical_tags_fire_once_per_occurrence() {
        let mut r = reassembler();
        let u1 = r.on_chunk("A", Some("c1"), "[pose:happy] un").unwrap();
        assert_eq!(u1.directives.len(), 1);

        let u2 = r.on_chunk("A", Some("c1"), " deux").unwrap();
        assert!(u2.directives.is_empty());

        let u3 = r.on_chunk("A", Some("c1"), " [pose:happy] trois").unwrap();
        assert_eq!(u3.directives.len(), 1);
        assert_eq!(u3.directives[0].display_before, "un deux");
        assert_eq!(u3.display, "un deux trois");
    }

    #[test]
    fn several_tags_in_one_chunk_fire_in_order() {
        let mut r = reassembler();
        let u = r
            .on_chunk("A", Some("c1"), "[pose:sad] hm [pose:angry] non")
            .unwrap();
        let values: Vec<_> = u.directives.iter().map(|h| h.directive.value.as_str()).collect();
        assert_eq!(values, vec!["sad", "angry"]);
        assert_eq!(u.display, "hm non");
    }

    #[test]
    fn display_is_concatenation_without_markers() {
        let fragments = ["Il ", "était [po", "se:thinking] une", " fois [pose:", "sh"];
        let mut r = reassembler();
        let mut last = None;
        for f in fragments {
            last = r.on_chunk("A", Some("c9"), f);
        }
        let joined: String = fragments.concat();
        assert_eq!(last.unwrap().display, r.syntax().clean(&joined));
        assert_eq!(r.syntax().clean(&joined), "Il était une fois");
    }

    #[test]
    fn chunk_without_correlation_is_dropped() {
        let mut r = reassembler();
        assert!(r.on_chunk("A", None, "perdu").is_none());
        assert_eq!(r.open_streams(), 0);
    }

    #[test]
    fn speakers_are_kept_apart() {
        let mut r = reassembler();
        r.on_chunk("A", Some("c1"), "un");
        r.on_chunk("B", Some("c1"), "deux");
        assert_eq!(r.open_streams(), 2);
        assert_eq!(r.buffer("A", "c1").unwrap().raw(), "un");
        assert_eq!(r.buffer("B", "c1").unwrap().raw(), "deux");
    }

    #[test]
    fn new_correlation_supersedes_same_speaker() {
        let mut r = reassembler();
        r.on_chunk("A", Some("c1"), "ancien");
        r.on_chunk("B", Some("c1"), "autre");
        let u = r.on_chunk("A", Some("c2"), "neuf").unwrap();

        assert_eq!(u.display, "neuf");
        assert!(r.buffer("A", "c1").is_none());
        assert!(r.buffer("B", "c1").is_some());
    }

    #[test]
    fn final_closes_buffer_and_builds_utterance() {
        let mut r = reassembler();
        r.on_chunk("A", Some("c1"), "Bonjour [pose:happy]");

        let utt = r.on_final("A", Some("c1"), Some("m1"), "Bonjour [pose:happy] toi");
        assert_eq!(r.open_streams(), 0);
        assert_eq!(utt.display_text, "Bonjour toi");
        assert_eq!(utt.directive, Some(happy()));
        assert_eq!(utt.message_id.as_deref(), Some("m1"));

        // A later chunk for the same key starts from scratch.
        let u = r.on_chunk("A", Some("c1"), "[pose:happy] encore").unwrap();
        assert_eq!(u.directives.len(), 1);
    }

    #[test]
    fn clear_drops_all_streams() {
        let mut r = reassembler();
        r.on_chunk("A", Some("c1"), "x");
        r.on_chunk("B", Some("c2"), "y");
        r.clear();
        assert_eq!(r.open_streams(), 0);
    }
}
