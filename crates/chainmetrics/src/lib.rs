//! chainmetrics — extraction core for explorer pages: block-access
//! classification, layered value-extraction strategies and unit normalization.

pub mod assemble;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalize;
pub mod numeric;
pub mod page;
pub mod pipeline;
pub mod snapshot;
pub mod strategy;
pub mod types;

pub use classifier::{classify, BlockSignals};
pub use config::{
    load_targets, parse_targets, select_targets, target_key, LoadOptions, LoadPolicy, MetricSpec,
    PlausibleRange, TargetConfig, UnitFamily,
};
pub use error::{ConfigError, NavigationError, PageError, ScrapeError};
pub use page::{Locator, NavigationInfo, Observation, PageHandle};
pub use pipeline::extract_target;
pub use snapshot::SnapshotPage;
pub use strategy::{Strategy, StrategyConfig};
pub use types::*;
