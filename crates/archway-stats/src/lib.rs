//! Archway Stats - durable, date-rotating transfer-statistics log
//!
//! One line is appended per completed (or partially completed) batch. The
//! log filename comes from a template that may embed the current date; the
//! open file rotates exactly when an enabled date component changes.

pub mod recorder;

pub use recorder::StatisticsRecorder;
