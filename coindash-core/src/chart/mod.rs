//! Chart side of the pipeline: loaded series and the widget adapter

pub mod adapter;
pub mod series;

pub use adapter::{ChartAdapter, ChartSurface, HISTORY_PAGE_LIMIT, LOAD_MORE_THRESHOLD};
pub use series::CandleSeries;
