//! Data plumbing for the charter engine.
//!
//! History pages come in through a [`HistorySource`] and are gated by the
//! [`HistoryLoader`]; live frames are routed by the [`ConnectionSupervisor`]
//! and folded into the active series by [`LiveIngest`].

pub mod api;
pub mod error;
pub mod history;
pub mod live;
pub mod source;
pub mod supervisor;
pub mod validation;

pub use api::ApiSource;
pub use error::{Error, Result};
pub use history::{HistoryLoader, PageOutcome};
pub use live::{IngestOutcome, LiveIngest};
pub use source::HistorySource;
pub use supervisor::{ConnectionSupervisor, LiveEvent, LiveFeed, Subscription};
