//! C/TCL test-suite parser (valkey's `tclsh` test runner convention),
//! ported bit-exact from
//! `original_source/multi_swe_bench/harness/repos/c/valkey_io/valkey.py::parse_log`.
//! Three independent sets, no retraction at all: a name that appears as
//! both `[err]` and `[ok]` across the log sits in both `failed_tests` and
//! `passed_tests` simultaneously — unlike Go, nothing here ever checks
//! one set before inserting into another.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::TestResult;

lazy_static! {
    static ref OK_RE: Regex = Regex::new(r"^\[ok\]: (.+?)( \(.+\))?$").unwrap();
    static ref ERR_RES: [Regex; 2] = [
        Regex::new(r"^\[err\]: (.+?)( \(.+\))?$").unwrap(),
        Regex::new(r"^\[exception\]: (.+?)( \(.+\))?$").unwrap(),
    ];
}

pub fn parse_log(raw_log: &str) -> TestResult {
    let mut result = TestResult::default();

    for line in raw_log.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = OK_RE.captures(line) {
            result.passed_tests.insert(caps[1].to_string());
        }

        for err_re in ERR_RES.iter() {
            if let Some(caps) = err_re.captures(line) {
                result.failed_tests.insert(caps[1].to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_err_exception_lines() {
        let log = "[ok]: SET and GET work\n\
                    [err]: EXPIRE with negative ttl (expected error got ok)\n\
                    [exception]: unexpected disconnect\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("SET and GET work"));
        assert!(result.failed_tests.contains("EXPIRE with negative ttl"));
        assert!(result.failed_tests.contains("unexpected disconnect"));
    }

    /// Fail is sticky and a later pass never retracts it — matching
    /// `spec.md`'s stated contract and `valkey.py`'s lack of any retraction
    /// logic (a name can sit in both sets at once).
    #[test]
    fn a_later_pass_does_not_retract_an_earlier_failure() {
        let log = "[err]: flaky test\n[ok]: flaky test\n";
        let result = parse_log(log);
        assert!(result.failed_tests.contains("flaky test"));
        assert!(result.passed_tests.contains("flaky test"));
    }
}
