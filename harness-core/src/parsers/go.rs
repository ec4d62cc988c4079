//! Go `go test -v` output parser, ported bit-exact from
//! `original_source/multi_swe_bench/harness/repos/golang/etcd_io/etcd.py::parse_log`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::TestResult;

lazy_static! {
    static ref PASS_RE: Regex = Regex::new(r"^--- PASS: (\S+)").unwrap();
    static ref FAIL_RES: [Regex; 2] = [
        Regex::new(r"^--- FAIL: (\S+)").unwrap(),
        Regex::new(r"^FAIL:?\s?(.+?)\s").unwrap(),
    ];
    static ref SKIP_RE: Regex = Regex::new(r"^--- SKIP: (\S+)").unwrap();
}

/// Strips a Go subtest's last `/`-segment to get the name of its parent
/// test, e.g. `TestFoo/bar/baz` -> `TestFoo/bar`; a name with no `/` is
/// returned unchanged (matches `get_base_name` in the source, which
/// returns `test_name` itself when `rfind("/")` is `-1`).
pub fn get_base_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Port of `etcd.py`'s `parse_log`. The pass/skip retraction checks test
/// for membership in `failed_tests` using the *raw* (un-based) name, while
/// insertion always uses the base name — so a failing subtest
/// (`TestA/Sub2`) never retracts its sibling's already-recorded pass
/// (`TestA`, from `TestA/Sub1`), since `"TestA/Sub2" != "TestA"`. This
/// asymmetry is what lets a base name sit in both `passed_tests` and
/// `failed_tests` at once (see S4 in the test module below).
pub fn parse_log(raw_log: &str) -> TestResult {
    let mut result = TestResult::default();

    for line in raw_log.lines() {
        let line = line.trim();

        if let Some(caps) = PASS_RE.captures(line) {
            let name = &caps[1];
            if !result.failed_tests.contains(name) {
                result.passed_tests.insert(get_base_name(name).to_string());
            }
        }

        for fail_re in FAIL_RES.iter() {
            if let Some(caps) = fail_re.captures(line) {
                let name = &caps[1];
                result.passed_tests.remove(name);
                result.skipped_tests.remove(name);
                result.failed_tests.insert(get_base_name(name).to_string());
            }
        }

        if let Some(caps) = SKIP_RE.captures(line) {
            let name = &caps[1];
            if !result.failed_tests.contains(name) {
                result.skipped_tests.insert(get_base_name(name).to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pass_fail_skip() {
        let log = "--- PASS: TestA (0.00s)\n--- FAIL: TestB (0.00s)\n--- SKIP: TestC (0.00s)\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("TestA"));
        assert!(result.failed_tests.contains("TestB"));
        assert!(result.skipped_tests.contains("TestC"));
    }

    /// S4: a subtest failure and its sibling's pass both surface on the
    /// parent name, simultaneously, because the fail-retraction check
    /// compares the raw subtest name against `passed_tests`, which only
    /// ever holds base names.
    #[test]
    fn subtest_pass_and_sibling_subtest_fail_both_surface_on_parent() {
        let log = "--- PASS: TestA/Sub1\n--- FAIL: TestA/Sub2\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("TestA"));
        assert!(result.failed_tests.contains("TestA"));
    }

    #[test]
    fn exact_name_failure_retracts_its_own_pass() {
        let log = "--- PASS: TestFlaky\n--- FAIL: TestFlaky\n";
        let result = parse_log(log);
        assert!(!result.passed_tests.contains("TestFlaky"));
        assert!(result.failed_tests.contains("TestFlaky"));
    }

    #[test]
    fn get_base_name_strips_last_segment_only() {
        assert_eq!(get_base_name("TestFoo/bar/baz"), "TestFoo/bar");
        assert_eq!(get_base_name("TestFoo"), "TestFoo");
    }

    #[test]
    fn secondary_fail_pattern_matches_package_level_failure() {
        let log = "FAIL\tgithub.com/etcd-io/etcd/server\t0.003s\n";
        let result = parse_log(log);
        assert!(result.failed_tests.contains("github.com/etcd-io/etcd/server"));
    }
}
