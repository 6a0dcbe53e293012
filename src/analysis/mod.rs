//! Method-summary analyses.
//!
//! A parallel sweep populating the optimization-info records (receiver
//! escape, parameter usage, trivial initializers) that the class inliner
//! consumes. Facts accumulate monotonically; absence always reads as the
//! least informative value.

mod summaries;

pub use summaries::SummaryAnalysis;
