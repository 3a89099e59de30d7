//! Error capture types and classification.
//!
//! A failure is described by [`ErrorDetails`], classified by the ordered rule
//! tables of [`ErrorClassifier`] into category, severity, user impact and
//! recoverability, and stored as an immutable [`ErrorRecord`].

pub mod classification;
pub mod classifier;

pub use classification::{
    Classification, ErrorCategory, ErrorDetails, ErrorRecord, Severity, UserImpact,
};
pub use classifier::{CategoryRule, ErrorClassifier, Field, Matcher, SeverityRule};
