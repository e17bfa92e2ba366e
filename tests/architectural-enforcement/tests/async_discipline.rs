//! Integration Test: Async Discipline
//!
//! **Policy**: production code never parks a runtime thread.
//! - No `std::thread::sleep` anywhere
//! - No `reqwest::blocking`
//! - No `std::fs` / `std::net` calls inside an `async` body; file work in
//!   async code goes through `tokio::fs` or `spawn_blocking`
//!
//! Config loading and saving are plain functions and may use `std::fs`.

use architectural_enforcement::{
    assert_clean, async_body_mask, code_part, production_sources, PRODUCTION_DIRS,
};

#[test]
fn test_no_thread_sleep_in_production_code() {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in production_sources(dir) {
            for (idx, line) in file.lines.iter().enumerate() {
                if code_part(line).contains("thread::sleep") {
                    violations.push(file.violation(idx, "Thread sleep"));
                }
            }
        }
    }

    assert_clean("no std::thread::sleep in production code", &violations);
}

#[test]
fn test_no_blocking_http_client() {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in production_sources(dir) {
            for (idx, line) in file.lines.iter().enumerate() {
                if code_part(line).contains("reqwest::blocking") {
                    violations.push(file.violation(idx, "Blocking HTTP client"));
                }
            }
        }
    }

    assert_clean("no reqwest::blocking in production code", &violations);
}

#[test]
fn test_no_blocking_io_in_async_bodies() {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in production_sources(dir) {
            let mask = async_body_mask(&file.lines);
            for (idx, line) in file.lines.iter().enumerate() {
                if !mask[idx] {
                    continue;
                }
                let code = code_part(line);
                if code.contains("std::fs::") || code.contains("std::net::") {
                    violations.push(file.violation(idx, "Blocking I/O in async"));
                }
            }
        }
    }

    assert_clean("no std::fs / std::net inside async bodies", &violations);
}
