//! Consumed data-source contract.
//!
//! Manifold itself never talks to a database; data endpoints are built on
//! top of components implementing [`DataSource`]. The router only needs
//! the shapes below to turn query results into JSON responses.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A channel advertised by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel name, unique within the source.
    pub name: String,
    /// Optional channel kind (e.g. `timeseries`, `histogram`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One channel's slice of a time-series query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSlice {
    /// Start of the window (unix seconds).
    pub start: f64,
    /// Window length in seconds.
    pub length: f64,
    /// Sample timestamps, relative to `start`.
    pub t: Vec<f64>,
    /// Sample values; numeric for time series, arbitrary JSON for objects.
    pub x: Vec<Value>,
}

/// Optional resampling controls for time-series queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesOptions {
    /// Resampling interval in seconds, if the source should downsample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resample: Option<f64>,
    /// Reducer applied per resampling bucket (e.g. `mean`, `last`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reducer: Option<String>,
}

/// The interface a pluggable data source exposes to the routing layer.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Lists the channels this source can answer for.
    async fn get_channels(&self) -> Vec<ChannelInfo>;

    /// Fetches time-series windows for the named channels.
    async fn get_timeseries(
        &self,
        channels: &[String],
        length: f64,
        to: f64,
        options: &SeriesOptions,
    ) -> HashMap<String, SeriesSlice>;

    /// Fetches the latest objects (non-numeric payloads) for the named
    /// channels.
    async fn get_object(
        &self,
        channels: &[String],
        length: f64,
        to: f64,
    ) -> HashMap<String, Value>;
}
