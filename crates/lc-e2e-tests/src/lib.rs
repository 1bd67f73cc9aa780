//! End-to-end tests for LogCurl live under `tests/`; this crate has no
//! runtime code.
