pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
