// tests/common/mod.rs

#![allow(dead_code)]

use std::error::Error;

pub use devloop_test_utils::{init_tracing, unused_local_addr, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;
