use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::policy::{Limits, DEFAULT_CAPACITY, DEFAULT_MAX_SHARE_PERCENT};
use crate::upload::Retention;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub class_list_path: PathBuf,
    pub model_input_op: String,
    pub model_output_op: String,
    pub model_url: Option<String>,
    pub class_list_url: Option<String>,
    pub closet_path: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_retention: Retention,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());

        let body_limit_mb: usize = parse(&lookup, "BODY_LIMIT_MB", 5)?;
        let capacity: u32 = parse(&lookup, "CLOSET_CAPACITY", DEFAULT_CAPACITY)?;
        let max_share_percent: f64 =
            parse(&lookup, "CLOSET_MAX_SHARE_PERCENT", DEFAULT_MAX_SHARE_PERCENT)?;
        if !(0.0..=100.0).contains(&max_share_percent) {
            return Err(ConfigError::InvalidValue {
                var: "CLOSET_MAX_SHARE_PERCENT",
                reason: "must be between 0 and 100".to_string(),
            });
        }

        Ok(Config {
            port: parse(&lookup, "PORT", 5020)?,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            model_path: string("MODEL_PATH", "./model/clothing_sorter.pb").into(),
            class_list_path: string("CLASS_LIST_PATH", "./model/class_list.txt").into(),
            model_input_op: string("MODEL_INPUT_OP", "x"),
            model_output_op: string("MODEL_OUTPUT_OP", "Identity"),
            model_url: lookup("MODEL_URL"),
            class_list_url: lookup("CLASS_LIST_URL"),
            closet_path: string("CLOSET_PATH", "closet.json").into(),
            upload_dir: string("UPLOAD_DIR", "static/uploads").into(),
            upload_retention: parse(&lookup, "UPLOAD_RETENTION", Retention::Retain)?,
            limits: Limits {
                capacity,
                max_share_percent,
            },
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
