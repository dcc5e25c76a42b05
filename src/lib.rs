//! Diffgrade
//!
//! Randomized differential testing of submissions against a reference
//! implementation:
//!
//! - **Role validation**: reference types declare solutions, generators,
//!   verifiers and lifecycle hooks, checked once at load time
//! - **Input synthesis**: edge cases, simple cases, then generated values at
//!   rising complexity, with regression revisits of earlier receivers
//! - **Differential execution**: both implementations run on the same inputs
//!   with timeouts, and their observable behavior is compared
//! - **Isolation**: hook code only reaches submission objects through an
//!   access-checked proxy
//!
//! The engine lives in [`diffgrade_core`] and is re-exported here. See
//! [`demos`] for built-in questions.

#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

pub mod demos;

pub use diffgrade_core::*;
