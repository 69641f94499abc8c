//! Configuration module for Sumi-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Command-line flags are applied on top by the binary.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, CrawlerConfig, OutputConfig, PolitenessConfig, ScopeConfig,
    SitemapConfig, UserAgentConfig,
};

pub use parser::{load_config, parse_config};
pub use validation::{validate, validate_seed};
