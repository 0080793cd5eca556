/*!
 * Caption generation: speech marks in, timed SRT cues out.
 */

pub mod cue;
pub mod speech_marks;
pub mod synthesizer;

pub use cue::{parse_srt_file, parse_srt_string, to_srt_string, write_srt, Cue};
pub use speech_marks::{load_speech_marks, parse_speech_marks, SpeechMark, SpeechMarkKind};
pub use synthesizer::{split_sentences, wrap_lines, SubtitleSynthesizer, SynthesisOptions};
