//! Output module for end-of-run reporting

pub mod stats;

pub use stats::{print_report, print_review_report, ReviewReport, RunReport};
