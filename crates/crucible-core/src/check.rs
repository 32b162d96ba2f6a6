//! Assertion primitives, mismatch reporting, and the run exit protocol.
//!
//! Failures are fatal to the whole run: the formatted report goes to the
//! error stream (`error at <file>:<line> - <message>`) and the calling
//! thread panics, which terminates a verification binary. The driver never
//! catches a failure to continue with the next matrix cell.
//!
//! Range comparisons report at most [`MAX_REPORTED_MISMATCHES`] differing
//! positions so a large sweep cannot flood the log.

use std::fmt;
use std::process::exit;

use tracing::error;

/// Exit code distinguishing "nothing was runnable here" from failure.
pub const SKIP_RETURN_CODE: i32 = 77;

/// Per-element mismatch reports are capped at this many lines.
pub const MAX_REPORTED_MISMATCHES: usize = 10;

/// Overall outcome of a verification run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunStatus {
    /// At least one matrix cell ran and every check passed.
    Passed,
    /// No matrix cell was runnable on the current device.
    Skipped,
}

/// Process exit code for `status`.
pub fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Passed => 0,
        RunStatus::Skipped => SKIP_RETURN_CODE,
    }
}

/// Print the final status line and return the matching exit code.
///
/// Verification binaries end with `std::process::exit(done(status))` so CI
/// can tell "passed" (0) from "not applicable here" (77) from "failed"
/// (any panic-driven nonzero code).
pub fn done(status: RunStatus) -> i32 {
    match status {
        RunStatus::Passed => println!("passed"),
        RunStatus::Skipped => println!("Skipped"),
    }
    exit_code(status)
}

/// Run `body` and exit with the protocol code: its status on success, a
/// failure code if it errored or panicked.
pub fn harness_main<F>(body: F) -> !
where
    F: FnOnce() -> crate::error::Result<RunStatus> + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(body) {
        Ok(Ok(status)) => exit(done(status)),
        Ok(Err(err)) => {
            eprintln!("error: {err}");
            exit(1)
        }
        // The failure report was already printed by the assertion that
        // panicked.
        Err(_) => exit(1),
    }
}

fn prefix(file: &str, line: u32, message: &str) -> String {
    format!("error at {file}:{line} - {message}")
}

fn fail(report: String) -> ! {
    error!(target: "crucible", "{report}");
    eprintln!("{report}");
    panic!("{report}");
}

/// Fail unless `condition == expected`.
pub fn expect(expected: bool, condition: bool, file: &str, line: u32, message: &str) {
    if condition != expected {
        fail(prefix(file, line, message));
    }
}

/// Fail with an `expected X got Y` report unless the values are equal.
pub fn expect_eq<E, A>(expected: &E, actual: &A, file: &str, line: u32, message: &str)
where
    E: PartialEq<A> + fmt::Debug,
    A: fmt::Debug,
{
    if !(expected == actual) {
        fail(format!(
            "{}, expected {:?} got {:?}",
            prefix(file, line, message),
            expected,
            actual
        ));
    }
}

/// Comparison policy for element checks. Exact equality is the default; a
/// tolerance variant can be added here without touching call sites.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ComparePolicy {
    /// Bit-exact equality via `PartialEq`.
    #[default]
    Exact,
}

impl ComparePolicy {
    /// Compare two elements under this policy.
    pub fn matches<T: PartialEq>(self, expected: &T, actual: &T) -> bool {
        match self {
            ComparePolicy::Exact => expected == actual,
        }
    }
}

/// Elementwise sequence check under the default exact policy.
pub fn expect_eq_n<T>(expected: &[T], actual: &[T], file: &str, line: u32, message: &str)
where
    T: PartialEq + fmt::Debug,
{
    expect_eq_n_policy(ComparePolicy::Exact, expected, actual, file, line, message);
}

/// Elementwise sequence check.
///
/// A length mismatch is reported with both lengths. Otherwise up to
/// [`MAX_REPORTED_MISMATCHES`] differing positions are printed, each as
/// `at index <k> expected <e> got <a>`, and the run terminates if any
/// position differed.
pub fn expect_eq_n_policy<T>(
    policy: ComparePolicy,
    expected: &[T],
    actual: &[T],
    file: &str,
    line: u32,
    message: &str,
) where
    T: PartialEq + fmt::Debug,
{
    if expected.len() != actual.len() {
        fail(format!(
            "{}, expected sequence of size {} got sequence of size {}",
            prefix(file, line, message),
            expected.len(),
            actual.len()
        ));
    }

    let mut first_report = None;
    let mut mismatches = 0usize;
    for (k, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        if !policy.matches(e, a) {
            let report = format!(
                "{}, at index {} expected {:?} got {:?}",
                prefix(file, line, message),
                k,
                e,
                a
            );
            eprintln!("{report}");
            if first_report.is_none() {
                first_report = Some(report);
            }
            mismatches += 1;
            if mismatches == MAX_REPORTED_MISMATCHES {
                break;
            }
        }
    }

    if let Some(report) = first_report {
        error!(target: "crucible", "{report}");
        panic!("{report}");
    }
}

/// Check that every element of `range` equals `value`.
pub fn check_values<T: PartialEq>(range: &[T], value: &T) -> bool {
    range.iter().all(|x| x == value)
}

/// Fill a slice from an index function, `slice[i] = f(i)`.
pub fn fill_with<T, F: FnMut(usize) -> T>(slice: &mut [T], mut f: F) {
    for (i, slot) in slice.iter_mut().enumerate() {
        *slot = f(i);
    }
}

/// Fail unless the condition holds; reports the call site.
#[macro_export]
macro_rules! expect_true {
    ($cond:expr, $msg:expr) => {
        $crate::check::expect(true, $cond, file!(), line!(), $msg)
    };
}

/// Fail if the condition holds; reports the call site.
#[macro_export]
macro_rules! expect_false {
    ($cond:expr, $msg:expr) => {
        $crate::check::expect(false, $cond, file!(), line!(), $msg)
    };
}

/// Fail with an `expected X got Y` report unless the two values are equal.
#[macro_export]
macro_rules! expect_eq {
    ($expected:expr, $actual:expr, $msg:expr) => {
        $crate::check::expect_eq(&$expected, &$actual, file!(), line!(), $msg)
    };
}

/// Fail unless the two sequences are elementwise equal; reports up to ten
/// differing positions.
#[macro_export]
macro_rules! expect_eq_n {
    ($expected:expr, $actual:expr, $msg:expr) => {
        $crate::check::expect_eq_n($expected, $actual, file!(), line!(), $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    fn panic_message<F: FnOnce() + std::panic::UnwindSafe>(f: F) -> String {
        let payload = catch_unwind(f).expect_err("check should have failed");
        payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| panic!("non-string panic payload"))
    }

    #[test]
    fn passing_checks_are_silent() {
        expect(true, true, "f", 1, "ok");
        expect_eq(&3, &3, "f", 2, "ok");
        expect_eq_n(&[1, 2], &[1, 2], "f", 3, "ok");
    }

    #[test]
    fn expect_reports_file_and_line() {
        let msg = panic_message(|| expect(true, false, "driver.rs", 10, "wrong effect"));
        assert_eq!(msg, "error at driver.rs:10 - wrong effect");
    }

    #[test]
    fn expect_eq_reports_both_values() {
        let msg = panic_message(|| expect_eq(&4, &7, "case.rs", 21, "sum"));
        assert_eq!(msg, "error at case.rs:21 - sum, expected 4 got 7");
    }

    #[test]
    fn length_mismatch_reports_both_sizes() {
        let msg = panic_message(|| expect_eq_n(&[1, 2, 3], &[1, 2], "t.rs", 5, "out"));
        assert_eq!(
            msg,
            "error at t.rs:5 - out, expected sequence of size 3 got sequence of size 2"
        );
    }

    #[test]
    fn element_mismatch_reports_index_and_values() {
        let msg = panic_message(|| expect_eq_n(&[1, 2, 3], &[1, 9, 3], "t.rs", 6, "out"));
        assert_eq!(msg, "error at t.rs:6 - out, at index 1 expected 2 got 9");
    }

    #[test]
    fn mismatch_reporting_is_capped() {
        // 32 mismatching positions; the panic still carries the first one.
        let expected = vec![0u32; 32];
        let actual = vec![1u32; 32];
        let msg = panic_message(move || expect_eq_n(&expected, &actual, "t.rs", 7, "out"));
        assert_eq!(msg, "error at t.rs:7 - out, at index 0 expected 0 got 1");
    }

    #[test]
    fn exit_codes_follow_the_protocol() {
        assert_eq!(exit_code(RunStatus::Passed), 0);
        assert_eq!(exit_code(RunStatus::Skipped), SKIP_RETURN_CODE);
    }

    #[test]
    fn helpers() {
        assert!(check_values(&[5, 5, 5], &5));
        assert!(!check_values(&[5, 6], &5));

        let mut data = [0usize; 4];
        fill_with(&mut data, |i| i * i);
        assert_eq!(data, [0, 1, 4, 9]);
    }

    #[test]
    fn macros_capture_call_site() {
        let msg = panic_message(|| crate::expect_eq!(1, 2, "macro"));
        assert!(msg.contains("check.rs:"));
        assert!(msg.ends_with("- macro, expected 1 got 2"));
    }
}
