//! Portcullis common utilities

pub mod logging;
pub mod tsid;

pub use tsid::TsidGenerator;
