//! Test utilities for the graphite reader.
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let config = TestConfigBuilder::new()
//!     .with_request_timeout(Duration::from_millis(50))
//!     .with_throttling("acme", 1.0)
//!     .build();
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;
