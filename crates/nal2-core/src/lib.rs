//! # nal2-core
//!
//! Fitting engine collaborator interface and the pieces shared by the
//! server and the host binary.
//!
//! - [`engine`]: the `Engine` trait and the exactly-once [`Completion`] handle
//! - [`serial`]: a single dispatch queue that serializes a blocking backend
//! - [`envelope`]: the `sequence_num` / `function` / `input_parameters` wire shape
//! - [`mock`]: a zero-filled fitting backend for development and tests

#![deny(unsafe_code)]

pub mod engine;
pub mod envelope;
pub mod mock;
pub mod serial;

pub use engine::{Completion, Engine, EngineError, EngineResult};
pub use envelope::{EnvelopeError, FitRequest, FitResponse};
pub use mock::MockFitting;
pub use serial::{FittingBackend, SerialEngine};
