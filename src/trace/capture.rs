use super::frame::StackFrame;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Frames belonging to the capture machinery itself are dropped from the top
/// of every captured trace.
const CAPTURE_PREFIXES: &[&str] = &["std::backtrace", "<std::backtrace", "backtrace_rs", "std::backtrace_rs"];

const CAPTURE_TYPE: &str = concat!(module_path!(), "::StackTrace");

thread_local! {
    static FAILURE_CAPTURE: Cell<bool> = Cell::new(true);
}

/// Run `f` with failure-site capture switched on or off for this thread,
/// restoring the previous setting afterwards.
pub(crate) fn with_failure_capture<R>(enabled: bool, f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            FAILURE_CAPTURE.with(|c| c.set(self.0));
        }
    }

    let _restore = Restore(FAILURE_CAPTURE.with(|c| c.replace(enabled)));
    f()
}

/// An immutable snapshot of a thread's stack.
///
/// Capturing only records the raw return addresses; symbols are resolved the
/// first time [`StackTrace::frames`] is called, which in practice means only
/// when an operation fails.
#[derive(Clone)]
pub struct StackTrace {
    inner: Arc<TraceInner>,
}

struct TraceInner {
    raw: Option<Backtrace>,
    skip: &'static [&'static str],
    frames: OnceLock<Vec<StackFrame>>,
}

impl StackTrace {
    /// Capture the current thread's stack, whatever `RUST_BACKTRACE` says.
    pub fn capture() -> Self {
        Self::capture_skipping(&[])
    }

    /// Like [`StackTrace::capture`], additionally dropping leading frames whose
    /// path starts with one of `skip`.
    pub(crate) fn capture_skipping(skip: &'static [&'static str]) -> Self {
        let raw = Backtrace::force_capture();
        let raw = match raw.status() {
            BacktraceStatus::Captured => Some(raw),
            _ => None,
        };

        Self {
            inner: Arc::new(TraceInner {
                raw,
                skip,
                frames: OnceLock::new(),
            }),
        }
    }

    /// Capture for a failure descriptor, or an empty trace when the running
    /// operation's runtime has failure-site capture turned off.
    pub(crate) fn capture_failure_site(skip: &'static [&'static str]) -> Self {
        if FAILURE_CAPTURE.with(Cell::get) {
            Self::capture_skipping(skip)
        } else {
            Self::empty()
        }
    }

    /// A trace supplied as plain data, e.g. by a host runtime that walks its
    /// own stack.
    pub fn from_frames(frames: Vec<StackFrame>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(frames);
        Self {
            inner: Arc::new(TraceInner {
                raw: None,
                skip: &[],
                frames: cell,
            }),
        }
    }

    pub fn empty() -> Self {
        Self::from_frames(Vec::new())
    }

    pub fn frames(&self) -> &[StackFrame] {
        self.inner.frames.get_or_init(|| match &self.inner.raw {
            Some(raw) => {
                let frames = parse_backtrace(&raw.to_string());
                trim_capture_frames(frames, self.inner.skip)
            }
            None => Vec::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("captured", &self.inner.raw.is_some())
            .field("resolved", &self.inner.frames.get().map(Vec::len))
            .finish()
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::empty()
    }
}

fn is_capture_frame(frame: &StackFrame, skip: &[&str]) -> bool {
    let path = &frame.class_name;
    CAPTURE_PREFIXES.iter().any(|p| path.starts_with(p))
        || path == CAPTURE_TYPE
        || skip.iter().any(|p| path.starts_with(p))
}

fn trim_capture_frames(frames: Vec<StackFrame>, skip: &[&str]) -> Vec<StackFrame> {
    let start = frames
        .iter()
        .position(|f| !is_capture_frame(f, skip))
        .unwrap_or(frames.len());
    frames.into_iter().skip(start).collect()
}

/// Parse the rendered form of a `std::backtrace::Backtrace`:
///
/// ```text
///    3: my_crate::run
///              at ./src/main.rs:10:5
/// ```
///
/// Inlined symbols share a frame number and appear on their own unnumbered
/// line. Unresolved frames are dropped.
pub(crate) fn parse_backtrace(rendered: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();
    let mut last_resolved = false;

    for line in rendered.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(location) = trimmed.strip_prefix("at ") {
            if last_resolved {
                if let Some(frame) = frames.last_mut() {
                    let (file, line) = parse_location(location);
                    frame.file = Some(file);
                    frame.line = line;
                }
            }
            continue;
        }

        let symbol = match trimmed.split_once(": ") {
            Some((index, rest)) if index.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => trimmed,
        };

        if symbol == "<unknown>" || symbol.starts_with("note:") {
            last_resolved = false;
            continue;
        }

        frames.push(StackFrame::from_symbol(symbol));
        last_resolved = true;
    }

    frames
}

// `path:line:col`, where the path itself may contain colons.
fn parse_location(location: &str) -> (String, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    let path = parts.next();

    match (path, line, col) {
        (Some(path), Some(line), Some(col))
            if line.parse::<u32>().is_ok() && col.parse::<u32>().is_ok() =>
        {
            (path.to_string(), line.parse().ok())
        }
        _ => (location.to_string(), None),
    }
}
