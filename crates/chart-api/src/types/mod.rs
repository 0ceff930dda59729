//! Data types and models for chart API responses and stream frames.

mod market;
mod stream;

pub use market::*;
pub use stream::*;
