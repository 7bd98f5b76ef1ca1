//! Service layer for the injury report pipeline.
//!
//! This module contains the business logic for:
//! - Report download (`PdfFetcher`)
//! - Positioned text extraction (`pdf`)
//! - Table reconstruction (`ReportParser`)
//! - Field cleanup (`normalize`)

mod fetcher;
pub mod normalize;
pub mod pdf;
mod parser;

pub use fetcher::{FetchOutcome, HttpReportSource, PdfFetcher, ReportSource, SourceResponse};
pub use parser::ReportParser;
