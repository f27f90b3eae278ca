// keys-test-utils: Shared test utilities for the key-distribution suite.
//
// Provides a mock fetcher (a bare wire-protocol client that drives a live
// `keyserver` session from integration tests) and a temp keydir builder for
// exercising the fetcher's reconciler (C8) without a real server.

pub mod keydir;
pub mod mock_fetcher;

pub use keydir::TempKeydir;
pub use mock_fetcher::{Frame, MockFetcher};
