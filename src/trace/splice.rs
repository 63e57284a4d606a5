use super::capture::StackTrace;
use super::frame::StackFrame;

/// Join the failure-side trace and the call-site trace into one.
///
/// Failure-side frames come first, cut off where the worker's own task loop
/// begins; then the boundary frame; then every call-site frame.
/// Frames from here down belong to the pool dispatching the operation rather
/// than to the operation itself.
const DISPATCH_PREFIXES: &[&str] = &[
    crate::executor::MODULE,
    crate::runtime::MODULE,
    "std::panic",
    "<core::panic::",
];

fn is_dispatch_frame(frame: &StackFrame) -> bool {
    DISPATCH_PREFIXES
        .iter()
        .any(|p| frame.class_name.starts_with(p))
}

pub fn splice(call_site: &StackTrace, native: &StackTrace) -> Vec<StackFrame> {
    let native_frames: Vec<&StackFrame> = native
        .frames()
        .iter()
        .take_while(|f| !is_dispatch_frame(f))
        .collect();
    let call_frames = call_site.frames();

    let mut spliced = Vec::with_capacity(native_frames.len() + 1 + call_frames.len());
    spliced.extend(native_frames.into_iter().cloned());
    spliced.push(StackFrame::boundary());
    spliced.extend(call_frames.iter().cloned());
    spliced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_order() {
        let native = StackTrace::from_frames(vec![
            StackFrame::new("native::session", "decrypt"),
            StackFrame::new("native::session", "open"),
        ]);
        let call_site = StackTrace::from_frames(vec![StackFrame::new("app::Client", "send")]);

        let spliced = splice(&call_site, &native);
        assert_eq!(spliced.len(), 4);
        assert_eq!(spliced[0].method_name, "decrypt");
        assert!(spliced[2].is_boundary());
        assert_eq!(spliced[3].class_name, "app::Client");
    }

    #[test]
    fn test_splice_cuts_worker_loop() {
        let native = StackTrace::from_frames(vec![
            StackFrame::new("native::ops", "fail"),
            StackFrame::new(format!("{}::task::Task", crate::executor::MODULE), "execute"),
            StackFrame::new(format!("{}::worker::Worker", crate::executor::MODULE), "run"),
            StackFrame::new("std::thread", "spawn"),
        ]);

        let spliced = splice(&StackTrace::empty(), &native);
        assert_eq!(spliced.len(), 2);
        assert_eq!(spliced[0].method_name, "fail");
        assert!(spliced[1].is_boundary());
    }

    #[test]
    fn test_splice_cuts_panic_guard() {
        let native = StackTrace::from_frames(vec![
            StackFrame::new("app::ops", "validate"),
            StackFrame::new(
                "<core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>",
                "call_once",
            ),
            StackFrame::new("std::panicking::try", "do_call"),
            StackFrame::new("std::panic", "catch_unwind"),
        ]);

        let spliced = splice(&StackTrace::empty(), &native);
        assert_eq!(spliced.len(), 2);
        assert_eq!(spliced[0].method_name, "validate");
    }

    #[test]
    fn test_splice_with_empty_traces_keeps_boundary() {
        let spliced = splice(&StackTrace::empty(), &StackTrace::empty());
        assert_eq!(spliced, vec![StackFrame::boundary()]);
    }
}
