//! Structured logging for graphsweep runs
//!
//! Every phase, collection and resolution is bracketed by op events:
//! `log_op_start!` and `log_op_end!` on success, `log_op_error!` with the
//! canonical `err.kind`/`err.code` on failure. Hosts call [`init`] once;
//! tests read events back through [`init_test_capture`].
//!
//! ```rust
//! use graphsweep_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
