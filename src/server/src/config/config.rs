// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use arc_swap::ArcSwap;
use cloudblock_utils::httpclients::{HttpClientOptions, DEFAULT_USER_AGENT};
use common_telemetry::LoggingOptions;
use config::Config;
use dotenv::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{env, ops::Deref, sync::Arc, time::Duration};
use validator::Validate;

pub const DEFAULT_FEED_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
pub const DEFAULT_REFRESH_CRON: &str = "0 0 */6 * * *"; // Every six hours

// App Properties.

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct AppConfigProperties {
    #[serde(rename = "service-name")]
    #[validate(length(min = 1, max = 32))]
    pub service_name: String,
    #[serde(rename = "logging")]
    pub logging: LoggingOptions,
    #[serde(rename = "feed")]
    #[validate(nested)]
    pub feed: FeedProperties,
    #[serde(rename = "cache")]
    #[validate(nested)]
    pub cache: CacheProperties,
    #[serde(rename = "refresh")]
    pub refresh: RefreshProperties,
}

// Range Feed Properties.

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct FeedProperties {
    #[serde(rename = "url")]
    #[validate(url)]
    pub url: String,
    #[serde(rename = "connect-timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    // Notice: The total timeout bounds the whole fetch, never leave it unbounded.
    #[serde(rename = "timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

// Lookup Cache Properties.

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct CacheProperties {
    #[serde(rename = "max-capacity")]
    #[validate(range(min = 1))]
    pub max_capacity: u64,
    #[serde(rename = "ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

// Refresh Properties.

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshProperties {
    #[serde(rename = "enabled")]
    pub enabled: bool,
    #[serde(rename = "cron")]
    pub cron: String,
}

// App Properties impls.

impl Default for AppConfigProperties {
    fn default() -> Self {
        AppConfigProperties {
            service_name: String::from("cloudblock"),
            logging: LoggingOptions::default(),
            feed: FeedProperties::default(),
            cache: CacheProperties::default(),
            refresh: RefreshProperties::default(),
        }
    }
}

impl Default for FeedProperties {
    fn default() -> Self {
        FeedProperties {
            url: String::from(DEFAULT_FEED_URL),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            user_agent: String::from(DEFAULT_USER_AGENT),
        }
    }
}

impl FeedProperties {
    pub fn to_http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
            user_agent: self.user_agent.to_owned(),
        }
    }
}

impl Default for CacheProperties {
    fn default() -> Self {
        CacheProperties {
            max_capacity: 10_000,
            ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl Default for RefreshProperties {
    fn default() -> Self {
        // Only load once at startup unless explicitly enabled.
        RefreshProperties {
            enabled: false,
            cron: String::from(DEFAULT_REFRESH_CRON),
        }
    }
}

// App Configuration.

#[derive(Debug)]
pub struct AppConfig {
    pub inner: AppConfigProperties,
}

impl Deref for AppConfig {
    type Target = AppConfigProperties;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppConfig {
    pub fn new(config: &AppConfigProperties) -> Result<Arc<AppConfig>, anyhow::Error> {
        config.validate()?;
        Ok(Arc::new(AppConfig { inner: config.clone() }))
    }
}

/// Loads the properties from the file named by `CLOUDBLOCK_CFG_PATH` (if any),
/// overlaid by `CLOUDBLOCK__<SECTION>__<KEY>` environment variables.
pub fn load() -> Result<AppConfigProperties, anyhow::Error> {
    dotenv().ok(); // Notice: Must be called before parse from environment file (.env).

    let mut builder = Config::builder();
    if let Ok(path) = env::var("CLOUDBLOCK_CFG_PATH") {
        builder = builder.add_source(config::File::with_name(path.as_str()));
    }
    let properties = builder
        .add_source(
            config::Environment::with_prefix("CLOUDBLOCK")
                // Notice: Use double "_" to distinguish between different hierarchy struct or attribute alies at the same level.
                .separator("__")
                .convert_case(config::Case::Kebab)
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfigProperties>()?;

    Ok(properties)
}

fn init() -> Arc<AppConfig> {
    let config = load()
        .and_then(|properties| AppConfig::new(&properties))
        .unwrap_or_else(|err| panic!("Error loading config: {}", err));

    if env::var("CLOUDBLOCK_CFG_VERBOSE").is_ok() {
        tracing::info!("Loaded the config details: {:?}", config.inner);
    }

    config
}

/// Returns the global configuration, loading it on first access.
///
/// Panics if that first load fails; use [`load`] to handle errors instead.
pub fn get_config() -> Arc<AppConfig> {
    CONFIG.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    let config = AppConfig::new(&load()?)?;
    CONFIG.store(config);
    Ok(())
}

// Global the single refreshable configuration instance.
static CONFIG: Lazy<ArcSwap<AppConfig>> = Lazy::new(|| ArcSwap::from(init()));
