//! # OCR Runner
//!
//! Run a pretrained OCR model on one image and report the outcome as a single JSON object: the result on
//! stdout with exit code 0, or the error on stderr with exit code 1.

mod cli;
pub use cli::*;
mod invoker;
pub use invoker::*;
