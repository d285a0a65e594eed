//! Backtrace helpers that hide the narration wrapper's own frames.
//!
//! Every narrated call adds a frame for the wrapper that settles its
//! fragment. These helpers drop those frames so backtraces printed by an
//! application read as if the wrappers were not there.

use std::backtrace::Backtrace;
use std::fmt::Write as _;

use crate::frames::{Frame, parse_backtrace};

/// Function name marking the wrapper frame that settles a narrated call.
pub const WRAPPER_MARKER: &str = "narrate_it";

/// Whether `frame` belongs to the narration wrapper.
pub fn is_wrapper_frame(frame: &Frame) -> bool {
    frame.function.contains(WRAPPER_MARKER)
}

/// Frames of `backtrace`, outermost first, without wrapper frames.
pub fn extract_backtrace(backtrace: &Backtrace) -> Vec<Frame> {
    let mut frames = parse_backtrace(&backtrace.to_string());
    frames.retain(|frame| !is_wrapper_frame(frame));
    frames.reverse();
    frames
}

/// Frames of the calling thread's stack, outermost first, without wrapper frames.
pub fn capture_stack() -> Vec<Frame> {
    extract_backtrace(&Backtrace::force_capture())
}

/// One entry per frame, each ending in a newline.
pub fn format_frames(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .filter(|frame| !is_wrapper_frame(frame))
        .map(|frame| {
            let mut entry = format!("  {}\n", frame.function);
            match (&frame.file, frame.line) {
                (Some(file), Some(line)) => {
                    let _ = writeln!(entry, "        at {file}:{line}");
                }
                (Some(file), None) => {
                    let _ = writeln!(entry, "        at {file}");
                }
                _ => {}
            }
            entry
        })
        .collect()
}

/// `backtrace` rendered outermost first, without wrapper frames.
pub fn format_backtrace(backtrace: &Backtrace) -> String {
    format_frames(&extract_backtrace(backtrace)).concat()
}
