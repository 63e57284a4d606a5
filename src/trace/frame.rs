use std::fmt;

const BOUNDARY_CLASS: &str = "<async boundary>";
const BOUNDARY_METHOD: &str = "submitted from";

/// One frame of a stack trace, on either side of the runtime boundary.
///
/// `class_name` holds the enclosing path (a module path for Rust symbols,
/// a class for host frames) and `method_name` the function itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackFrame {
    pub class_name: String,
    pub method_name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// The sentinel placed between failure-side and call-site frames.
    pub fn boundary() -> Self {
        Self::new(BOUNDARY_CLASS, BOUNDARY_METHOD)
    }

    pub fn is_boundary(&self) -> bool {
        self.class_name == BOUNDARY_CLASS && self.method_name == BOUNDARY_METHOD
    }

    /// Build a frame from a demangled Rust symbol such as
    /// `my_crate::io::Reader::fill::{{closure}}`.
    pub fn from_symbol(symbol: &str) -> Self {
        let symbol = strip_hash(symbol.trim());
        let (class_name, method_name) = split_symbol(symbol);
        Self::new(class_name, method_name)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_boundary() {
            return write!(f, "--- {} ---", BOUNDARY_CLASS);
        }

        if self.class_name.is_empty() {
            write!(f, "{}", self.method_name)?;
        } else {
            write!(f, "{}.{}", self.class_name, self.method_name)?;
        }

        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "({}:{})", file, line),
            (Some(file), None) => write!(f, "({})", file),
            _ => write!(f, "(Unknown Source)"),
        }
    }
}

// Legacy mangling leaves a `::h<16 hex digits>` suffix.
fn strip_hash(symbol: &str) -> &str {
    if let Some(idx) = symbol.rfind("::h") {
        let hash = &symbol[idx + 3..];
        if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return &symbol[..idx];
        }
    }
    symbol
}

/// Split at the last top-level `::`, keeping trailing closure and turbofish
/// segments attached to the function they belong to.
fn split_symbol(symbol: &str) -> (String, String) {
    let mut separators = Vec::new();
    let mut depth = 0usize;
    let bytes = symbol.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            // `->` in fn pointer types is not a closing bracket
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'<' | b'{' | b'(' | b'[' => depth += 1,
            b'>' | b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                separators.push(i);
                i += 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    // Walk back over `{{closure}}` and `<T>` segments to find the function name.
    let mut split = None;
    for &sep in separators.iter().rev() {
        let segment_end = separators
            .iter()
            .find(|&&s| s > sep)
            .copied()
            .unwrap_or(symbol.len());
        let segment = &symbol[sep + 2..segment_end];
        if !segment.starts_with('{') && !segment.starts_with('<') {
            split = Some(sep);
            break;
        }
    }

    match split {
        Some(sep) => (symbol[..sep].to_string(), symbol[sep + 2..].to_string()),
        None => (String::new(), symbol.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_plain_symbol() {
        let frame = StackFrame::from_symbol("my_crate::io::Reader::fill");
        assert_eq!(frame.class_name, "my_crate::io::Reader");
        assert_eq!(frame.method_name, "fill");
    }

    #[test]
    fn test_from_symbol_strips_hash() {
        let frame = StackFrame::from_symbol("my_crate::run::h0123456789abcdef");
        assert_eq!(frame.class_name, "my_crate");
        assert_eq!(frame.method_name, "run");
    }

    #[test]
    fn test_closure_stays_with_function() {
        let frame = StackFrame::from_symbol("my_crate::tests::check_it::{{closure}}::{{closure}}");
        assert_eq!(frame.class_name, "my_crate::tests");
        assert_eq!(frame.method_name, "check_it::{{closure}}::{{closure}}");
    }

    #[test]
    fn test_turbofish_stays_with_function() {
        let frame = StackFrame::from_symbol("app::net::send::<u32>");
        assert_eq!(frame.class_name, "app::net");
        assert_eq!(frame.method_name, "send::<u32>");

        let frame = StackFrame::from_symbol("app::net::send::<u32>::{{closure}}");
        assert_eq!(frame.class_name, "app::net");
        assert_eq!(frame.method_name, "send::<u32>::{{closure}}");
    }

    #[test]
    fn test_trait_impl_symbol() {
        let frame = StackFrame::from_symbol("<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>::call_once");
        assert_eq!(frame.class_name, "<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>");
        assert_eq!(frame.method_name, "call_once");
    }

    #[test]
    fn test_unqualified_symbol() {
        let frame = StackFrame::from_symbol("main");
        assert_eq!(frame.class_name, "");
        assert_eq!(frame.method_name, "main");
    }

    #[test]
    fn test_display() {
        let frame = StackFrame::new("app::Session", "open").with_location("src/session.rs", 42);
        assert_eq!(frame.to_string(), "app::Session.open(src/session.rs:42)");
        assert_eq!(StackFrame::new("app", "run").to_string(), "app.run(Unknown Source)");
        assert!(StackFrame::boundary().is_boundary());
    }
}
