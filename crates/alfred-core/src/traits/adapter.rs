// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all plugin adapters must implement.

use async_trait::async_trait;

use crate::error::AlfredError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Alfred plugin adapters.
///
/// Provides identity, lifecycle, and health check capabilities. The name is
/// stable and used for logging and result attribution.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the stable identifier of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, AlfredError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), AlfredError>;
}
