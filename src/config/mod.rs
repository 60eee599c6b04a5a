//! Configuration module
//!
//! Loading, parsing, and validating TOML configuration files. Topics and
//! sources declared in the config are upserted into the store at startup;
//! the crawl itself reads them back from the store.

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, DiscoveryConfig, SourceEntry, SourceHints, StorageConfig, TopicEntry,
    UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
