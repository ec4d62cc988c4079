//! Gradle/JVM test-suite parser, ported bit-exact from
//! `original_source/multi_swe_bench/harness/repos/java/elastic/logstash.py::parse_log`.
//!
//! Three independent sets with one conditional retraction: a name matching
//! a pass pattern is only added to `passed_tests` if it isn't already in
//! `failed_tests`; a name matching a fail pattern is always added to
//! `failed_tests` and removed from `passed_tests` if present; skipped
//! entries are added unconditionally and never retract anything. No
//! cross-set retraction exists for `failed_tests`/`skipped_tests`
//! themselves, unlike the Go parser.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::TestResult;

lazy_static! {
    static ref PASSED_RES: [Regex; 3] = [
        Regex::new(r"^> Task :(\S+)$").unwrap(),
        Regex::new(r"^> Task :(\S+) UP-TO-DATE$").unwrap(),
        Regex::new(r"^(.+ > .+) PASSED$").unwrap(),
    ];
    static ref FAILED_RES: [Regex; 2] = [
        Regex::new(r"^> Task :(\S+) FAILED$").unwrap(),
        Regex::new(r"^(.+ > .+) FAILED$").unwrap(),
    ];
    static ref SKIPPED_RES: [Regex; 3] = [
        Regex::new(r"^> Task :(\S+) SKIPPED$").unwrap(),
        Regex::new(r"^> Task :(\S+) NO-SOURCE$").unwrap(),
        Regex::new(r"^(.+ > .+) SKIPPED$").unwrap(),
    ];
}

pub fn parse_log(raw_log: &str) -> TestResult {
    let mut result = TestResult::default();

    for line in raw_log.lines() {
        for passed_re in PASSED_RES.iter() {
            if let Some(caps) = passed_re.captures(line) {
                let name = &caps[1];
                if !result.failed_tests.contains(name) {
                    result.passed_tests.insert(name.to_string());
                }
            }
        }

        for failed_re in FAILED_RES.iter() {
            if let Some(caps) = failed_re.captures(line) {
                let name = caps[1].to_string();
                result.passed_tests.remove(&name);
                result.failed_tests.insert(name);
            }
        }

        for skipped_re in SKIPPED_RES.iter() {
            if let Some(caps) = skipped_re.captures(line) {
                result.skipped_tests.insert(caps[1].to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gradle_test_result_lines() {
        let log = "> Task :logstash-core:test\n\
                    org.logstash.FooTest > testBar PASSED\n\
                    org.logstash.FooTest > testBaz FAILED\n\
                    org.logstash.FooTest > testQux SKIPPED\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("org.logstash.FooTest > testBar"));
        assert!(result.failed_tests.contains("org.logstash.FooTest > testBaz"));
        assert!(result.skipped_tests.contains("org.logstash.FooTest > testQux"));
    }

    #[test]
    fn a_later_failure_retracts_an_earlier_pass() {
        let log = "org.logstash.FooTest > testFlaky PASSED\n\
                    org.logstash.FooTest > testFlaky FAILED\n";
        let result = parse_log(log);
        assert!(!result.passed_tests.contains("org.logstash.FooTest > testFlaky"));
        assert!(result.failed_tests.contains("org.logstash.FooTest > testFlaky"));
    }

    #[test]
    fn a_later_pass_does_not_retract_an_earlier_failure() {
        let log = "org.logstash.FooTest > testFlaky FAILED\n\
                    org.logstash.FooTest > testFlaky PASSED\n";
        let result = parse_log(log);
        assert!(result.failed_tests.contains("org.logstash.FooTest > testFlaky"));
        assert!(!result.passed_tests.contains("org.logstash.FooTest > testFlaky"));
    }

    #[test]
    fn up_to_date_task_line_counts_as_passed() {
        let log = "> Task :compileJava UP-TO-DATE\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("compileJava"));
    }

    #[test]
    fn bare_task_line_is_recorded_as_passed() {
        let log = "> Task :logstash-core:compileJava\n";
        let result = parse_log(log);
        assert!(result.passed_tests.contains("logstash-core:compileJava"));
    }
}
