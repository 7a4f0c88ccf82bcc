//! Chart sessions, request supersession, and the context that owns the caches

pub mod chart;
pub mod context;
pub mod guard;

pub use chart::{ChartSession, ChartView, LoadOutcome};
pub use context::{CacheStatus, ChartContext, Sources, Stores};
pub use guard::{RequestGuard, RequestTicket};
