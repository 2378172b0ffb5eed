//! Integration tests
//!
//! Fixtures for temporary mounts plus end-to-end scenarios driven through
//! the router.


mod e2e;
