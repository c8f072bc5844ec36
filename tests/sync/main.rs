// Integration tests for cache/restore sessions
// All sessions run against an in-memory store with failure injection

mod common;
mod download_tests;
