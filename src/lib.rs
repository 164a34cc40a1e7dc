#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # plane-allocator: hardware plane assignment for kms compositors
//!
//! This crate decides, for every repaint of an output, which parts of the
//! scene can be handed to the display hardware directly and which have to be
//! composited by the renderer. Scanning client buffers out on planes saves a
//! full copy of the content per frame and lets the gpu idle.
//!
//! ## Structure of the crate
//!
//! - [`view`] describes the positioned surface content fed into the assignment.
//! - [`backend::drm`] holds the assignment engine: plane registry, framebuffer
//!   cache, the propose strategies and the pending kms state they produce.
//! - [`backend::allocator`] contains the buffer types clients hand to the compositor.
//! - [`utils`] provides geometry, regions and clocks.
//!
//! The kernel itself is reached through the [`backend::drm::KmsDevice`] trait,
//! so the engine can be driven by any kms binding or, for testing, by the
//! in-memory device behind the `test_device` feature.
//!
//! ### Logging
//!
//! The crate makes extensive use of [`tracing`] for its internal logging.
//! Every strategy attempt is logged at `debug` level, individual plane
//! decisions at `trace` level.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```
//!
//! If you do not want to use [`tracing`], refer to [`log compatibility`](tracing#log-compatibility)
//! for how to forward the debug output to other `log` compatible frameworks.

pub mod backend;
pub mod utils;
pub mod view;
