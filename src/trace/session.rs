//! Scoped binding of the report being recorded
//!
//! One report is current per thread. [`report_guard`] installs a report and
//! resets the step counter; dropping the guard puts back whatever was bound
//! before, so sessions nest and are restored even when a panic unwinds
//! through the scope.

use std::cell::RefCell;
use tracing::debug;

use super::counter::reset_steps;
use super::report::SharedReport;
use crate::error::{Result, TraceError};

thread_local! {
    static CURRENT_REPORT: RefCell<Option<SharedReport>> = const { RefCell::new(None) };
}

/// Restores the previous binding when dropped
#[must_use = "the session ends when the guard is dropped"]
pub struct SessionGuard {
    previous: Option<SharedReport>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_REPORT.with(|cur| *cur.borrow_mut() = previous);
    }
}

/// Make `report` the current report until the guard is dropped
pub fn report_guard(report: SharedReport) -> SessionGuard {
    debug!(report = %report.borrow().name(), "session start");
    let previous = CURRENT_REPORT.with(|cur| cur.borrow_mut().replace(report));
    reset_steps();
    SessionGuard { previous }
}

/// Run `f` with `report` bound as the current report
pub fn with_report<F, R>(report: SharedReport, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = report_guard(report);
    f()
}

/// The report bound by the innermost active session
pub fn current_report() -> Result<SharedReport> {
    CURRENT_REPORT
        .with(|cur| cur.borrow().clone())
        .ok_or(TraceError::NoActiveSession)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::counter::next_step;
    use crate::trace::Report;
    use std::rc::Rc;

    #[test]
    fn test_no_active_session() {
        assert!(matches!(current_report(), Err(TraceError::NoActiveSession)));
    }

    #[test]
    fn test_guard_binds_and_restores() {
        let outer = Report::shared("outer");
        let inner = Report::shared("inner");

        let g1 = report_guard(outer.clone());
        assert!(Rc::ptr_eq(&current_report().unwrap(), &outer));
        {
            let _g2 = report_guard(inner.clone());
            assert!(Rc::ptr_eq(&current_report().unwrap(), &inner));
        }
        assert!(Rc::ptr_eq(&current_report().unwrap(), &outer));
        drop(g1);
        assert!(current_report().is_err());
    }

    #[test]
    fn test_guard_resets_counter() {
        next_step();
        next_step();
        let _g = report_guard(Report::shared("run"));
        assert_eq!(next_step(), 0);
    }

    #[test]
    fn test_restored_on_panic() {
        let report = Report::shared("panicking");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_report(report, || panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(current_report().is_err());
    }

    #[test]
    fn test_with_report_returns_value() {
        let report = Report::shared("run");
        let name = with_report(report, || current_report().unwrap().borrow().name().to_string());
        assert_eq!(name, "run");
    }
}
