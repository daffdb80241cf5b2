//! OTC API interaction module
//!
//! This module provides the core functionality for talking to Open Telekom
//! Cloud APIs, including authentication, endpoint resolution and the HTTP
//! client.
//!
//! # Module Structure
//!
//! - [`auth`] - Keystone token issuance and caching
//! - [`client`] - Main OTC client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use otc_modules::config::CloudConfig;
//! use otc_modules::otc::client::OtcClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = CloudConfig::load(None, Some("otc"))?;
//!     let client = OtcClient::new(&config)?;
//!     let routers = client.get(&client.network_url("routers").await?).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
