//! Utilities for working with panic payloads.
//!
//! These helpers aid in extracting useful information from `panic!` payloads
//! caught in connection tasks for logging and diagnostics.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use drugwire::panic::format_panic;
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(&payload).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
/// assert_eq!(format_panic(&payload).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_panic(&payload).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Borrow a caught panic payload for display.
#[expect(
    clippy::borrowed_box,
    reason = "a bare `&dyn Any` would also accept the box itself as the payload"
)]
pub fn format_panic(panic: &Box<dyn Any + Send>) -> PanicMessage<'_> { PanicMessage(&**panic) }
