//! Call-stack snapshots for divergence reports
//!
//! Instrumented layers push a [`Frame`] when they are entered and pop it
//! on exit, so every recorded item can carry the chain of layer calls that
//! led to it.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::panic::Location;

/// One source location in a call stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Source file
    pub file: String,
    /// Line number
    pub line: u32,
    /// Function or layer being executed
    pub function: String,
}

impl Frame {
    /// Create a frame
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// Frame at the caller's source location
    #[track_caller]
    pub fn caller(function: impl Into<String>) -> Self {
        let loc = Location::caller();
        Self::new(loc.file(), loc.line(), function)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.function)
    }
}

thread_local! {
    static LAYER_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame pushed by [`enter_frame`] when dropped, including on panic
pub struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        LAYER_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// Push a frame onto this thread's layer stack
#[must_use = "the frame is popped when the guard is dropped"]
pub fn enter_frame(frame: Frame) -> FrameGuard {
    LAYER_STACK.with(|s| s.borrow_mut().push(frame));
    FrameGuard { _private: () }
}

/// Copy of the current layer stack, oldest frame first
pub fn snapshot() -> Vec<Frame> {
    LAYER_STACK.with(|s| s.borrow().clone())
}

/// Render frames one per line, oldest first
pub fn format_frames(frames: &[Frame]) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str("  ");
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out
}

/// Print frames to stdout
pub fn print_frames(frames: &[Frame]) {
    print!("{}", format_frames(frames));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        let frame = Frame::new("model.rs", 42, "Encoder::forward");
        assert_eq!(frame.to_string(), "model.rs:42 in Encoder::forward");
    }

    #[test]
    fn test_frame_caller_location() {
        let frame = Frame::caller("test");
        assert!(frame.file.ends_with("stack.rs"));
        assert!(frame.line > 0);
    }

    #[test]
    fn test_guard_pops_in_order() {
        let outer = enter_frame(Frame::new("a.rs", 1, "outer"));
        {
            let _inner = enter_frame(Frame::new("b.rs", 2, "inner"));
            let stack = snapshot();
            assert_eq!(stack.len(), 2);
            assert_eq!(stack[0].function, "outer");
            assert_eq!(stack[1].function, "inner");
        }
        assert_eq!(snapshot().len(), 1);
        drop(outer);
        assert!(snapshot().is_empty());
    }

    #[test]
    fn test_format_frames() {
        let frames = vec![Frame::new("a.rs", 1, "f"), Frame::new("b.rs", 2, "g")];
        assert_eq!(format_frames(&frames), "  a.rs:1 in f\n  b.rs:2 in g\n");
    }
}
