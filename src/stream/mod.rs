//! Streaming text reassembly with inline directive extraction.
//!
//! ```text
//! narrative.chunk ──▶ Reassembler::on_chunk ──▶ ChunkUpdate { directives, display }
//! narrative.text  ──▶ Reassembler::on_final ──▶ Utterance ──▶ speech::SpeechQueue
//! ```

pub mod directive;
pub mod reassembler;

pub use directive::{Directive, DirectiveSyntax, Scan, TagSpan};
pub use reassembler::{ChunkUpdate, DirectiveHit, Reassembler, StreamBuffer, Utterance};
