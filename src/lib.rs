//! Workspace root crate.
//!
//! Carries no runtime code of its own -- `keyserver`, `keyfetch`, and
//! `keyadmin` are the three binaries this workspace produces. This crate
//! exists so the integration suites under `tests/integration/` have a
//! package to live in, the same shape the teacher workspace uses for its
//! own `tests/integration/e2e_*.rs` files.
