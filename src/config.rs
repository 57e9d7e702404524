use crate::error::{Error, Result};
use crate::feed::{FeedFilter, DEFAULT_RECONNECT_DELAY};
use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/detections";

/// Manila, where the deployment's operators read timestamps.
const DEFAULT_DISPLAY_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub ws_url: Url,
    pub reconnect_delay: Duration,
    pub feed_filter: FeedFilter,
    pub display_offset: FixedOffset,
    pub snapshot_dir: PathBuf,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, which maps a variable name to its
    /// value. Unset and empty values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = match var("PLATE_API_URL") {
            Some(v) => base_url("PLATE_API_URL", &v)?,
            None => base_url("PLATE_API_URL", DEFAULT_API_URL)?,
        };
        let ws_url = match var("PLATE_WS_URL") {
            Some(v) => Url::parse(&v).map_err(|_| Error::Config {
                key: "PLATE_WS_URL",
                value: v.clone(),
            })?,
            None => Url::parse(DEFAULT_WS_URL)?,
        };
        let reconnect_delay = match var("PLATE_RECONNECT_SECS") {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
                .ok_or(Error::Config {
                    key: "PLATE_RECONNECT_SECS",
                    value: v,
                })?,
            None => DEFAULT_RECONNECT_DELAY,
        };
        let feed_filter = match var("PLATE_FEED_FILTER") {
            Some(v) => v.parse()?,
            None => FeedFilter::default(),
        };
        let display_offset = match var("PLATE_DISPLAY_OFFSET") {
            Some(v) => parse_offset(&v).ok_or(Error::Config {
                key: "PLATE_DISPLAY_OFFSET",
                value: v,
            })?,
            None => default_offset(),
        };
        let snapshot_dir = var("PLATE_SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Config {
            api_url,
            ws_url,
            reconnect_delay,
            feed_filter,
            display_offset,
            snapshot_dir,
            token: var("PLATE_TOKEN"),
            username: var("PLATE_USERNAME"),
            password: var("PLATE_PASSWORD"),
        })
    }
}

impl Config {
    pub fn set_api_url(&mut self, value: &str) -> Result<()> {
        self.api_url = base_url("PLATE_API_URL", value)?;
        Ok(())
    }

    pub fn set_ws_url(&mut self, value: &str) -> Result<()> {
        self.ws_url = Url::parse(value).map_err(|_| Error::Config {
            key: "PLATE_WS_URL",
            value: value.to_string(),
        })?;
        Ok(())
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_DISPLAY_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Endpoint paths are joined onto the base, so it must end with a slash.
fn base_url(key: &'static str, value: &str) -> Result<Url> {
    let mut value = value.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|_| Error::Config { key, value })
}

/// Parses `+08:00`, `-0530`, `+8` or `UTC` style offsets.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let (hours, minutes) = if let Some(idx) = rest.find(':') {
        (&rest[..idx], &rest[idx + 1..])
    } else if rest.len() == 4 {
        (rest.get(..2)?, rest.get(2..)?)
    } else {
        (rest, "0")
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 || hours < 0 || minutes < 0 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
