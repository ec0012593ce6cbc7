use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
}

/// Tuning knobs for the buffer-manager building blocks. Values come from
/// defaults, an optional config file and the BUFBOX_* environment, in that
/// order of precedence.
#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    /// Max number of key/value pairs a page-table bucket holds before it splits.
    pub bucket_size: usize,
    /// The k in LRU-k: how many access timestamps to keep per frame.
    pub replacer_k: usize,
    /// Number of frames the buffer pool manages, i.e. the replacer size.
    pub pool_frames: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("bucket_size", 50_i64)?
            .set_default("replacer_k", 10_i64)?
            .set_default("pool_frames", 128_i64)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFBOX"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}
