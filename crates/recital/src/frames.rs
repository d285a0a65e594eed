//! Stack frame capture and correlation with narration fragments.
//!
//! Correlation runs only for verbose stores, at the fragment where a failure
//! originates. The live stack is captured once and matched against the
//! surviving fragments so verbose output can name the line each level was
//! executing.

use std::backtrace::Backtrace;
use std::borrow::Cow;

use serde::Serialize;

use crate::callsite::{SourceLocation, normalize_function, same_file};
use crate::fragment::Fragment;

/// One captured stack frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Demangled symbol, possibly with closure segments and a hash suffix.
    pub function: String,
    /// Source file, when debug info provides one.
    pub file: Option<String>,
    /// Line within `file`.
    pub line: Option<u32>,
}

impl Frame {
    /// A frame from its parts.
    pub fn new(function: impl Into<String>, file: Option<&str>, line: Option<u32>) -> Self {
        Self {
            function: function.into(),
            file: file.map(str::to_string),
            line,
        }
    }
}

/// Source of live stack frames.
pub trait FrameSource: Send + Sync {
    /// Frames of the calling thread, outermost first.
    fn capture(&self) -> Vec<Frame>;
}

/// Captures frames with [`Backtrace::force_capture`].
///
/// Line information depends on debug info being present in the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct BacktraceFrames;

impl FrameSource for BacktraceFrames {
    fn capture(&self) -> Vec<Frame> {
        let mut frames = parse_backtrace(&Backtrace::force_capture().to_string());
        frames.reverse();
        frames
    }
}

/// Capture through `source`, keeping at most the innermost `max_frames`.
pub fn capture_frames(source: &dyn FrameSource, max_frames: usize) -> Vec<Frame> {
    let mut frames = source.capture();
    if frames.len() > max_frames {
        let _ = frames.drain(..frames.len() - max_frames);
    }
    frames
}

/// Parse the `Display` form of a [`Backtrace`], innermost frame first.
///
/// Each numbered entry starts a frame; an unnumbered symbol line is a frame
/// inlined into the entry above it and `at file:line:col` lines attach to
/// the frame before them.
pub fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("note:") {
            continue;
        }
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let (file, line) = split_location(location);
                frame.file = Some(file.to_string());
                frame.line = line;
            }
            continue;
        }
        let symbol = match line.split_once(": ") {
            Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => symbol,
            _ => line,
        };
        frames.push(Frame::new(symbol, None, None));
    }
    frames
}

fn split_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    match (parts.next(), line, col) {
        (Some(file), Some(line), Some(_)) => (file, line.parse().ok()),
        _ => match location.rsplit_once(':') {
            Some((file, line)) => (file, line.parse().ok()),
            None => (location, None),
        },
    }
}

/// Annotate fragments with the frame each one was executing.
///
/// Fragments are walked newest to oldest while a cursor walks `frames`
/// (outermost first) from the inside out. A fragment's match leaves the
/// cursor on the matched frame, since consecutive fragments can share a
/// frame. A fragment without a match gets no location and leaves the cursor
/// where it was. Returns the number of annotated fragments.
pub fn correlate(fragments: &mut [Fragment], frames: &[Frame]) -> usize {
    let mut cursor = frames.len();
    let mut annotated = 0;
    for fragment in fragments.iter_mut().rev() {
        let site = fragment.call_site();
        let function = site.function.map(normalize_function);
        let found = frames[..cursor].iter().rposition(|frame| {
            frame.line.is_some()
                && frame.file.as_deref().is_none_or(|f| same_file(f, site.file))
                && match &function {
                    Some(expected) => same_function(&frame.function, expected),
                    None => frame.file.is_some(),
                }
        });
        let Some(index) = found else {
            continue;
        };
        let frame = &frames[index];
        fragment.set_location(SourceLocation {
            function: match site.function {
                Some(name) => Cow::Borrowed(name),
                None => Cow::Owned(normalize_function(&frame.function).into_owned()),
            },
            file: Cow::Owned(frame.file.clone().unwrap_or_else(|| site.file.to_string())),
            line: frame.line.unwrap_or(site.line),
        });
        annotated += 1;
        cursor = index + 1;
    }
    annotated
}

fn same_function(symbol: &str, expected: &str) -> bool {
    let symbol = normalize_function(symbol);
    symbol == expected
        || symbol
            .strip_suffix(expected)
            .is_some_and(|head| head.ends_with("::"))
}
