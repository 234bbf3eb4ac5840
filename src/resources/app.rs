//! Application installation versions.

use std::sync::Arc;

use tracing::info;

use crate::api::{AppInstallation, AppInstallationApi};
use crate::config::PollingConfig;
use crate::error::Result;
use crate::wait::{CallContext, PollOptions, app_version_ready, wait_for_app_version};

/// Moves application installations between versions.
pub struct AppInstallationResource {
    api: Arc<dyn AppInstallationApi>,
    options: PollOptions,
}

impl AppInstallationResource {
    /// Creates a new resource. Waits use [`PollOptions::FAST`] unless
    /// overridden.
    #[must_use]
    pub fn new(api: Arc<dyn AppInstallationApi>) -> Self {
        Self {
            api,
            options: PollOptions::default(),
        }
    }

    /// Creates a resource whose waits use the `polling.app` entry.
    #[must_use]
    pub fn from_config(api: Arc<dyn AppInstallationApi>, polling: &PollingConfig) -> Self {
        Self::new(api).with_options(polling.app_options())
    }

    /// Sets the wait options.
    #[must_use]
    pub const fn with_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads an installation.
    ///
    /// # Errors
    ///
    /// Returns an error if the installation cannot be read.
    pub async fn read(&self, ctx: &CallContext, installation_id: &str) -> Result<AppInstallation> {
        self.api.get_app_installation(ctx, installation_id).await
    }

    /// Requests `version` and waits until the installation runs it.
    ///
    /// Nothing is requested if the installation already runs `version`.
    ///
    /// # Errors
    ///
    /// Returns the request error as is, or a timeout-shaped error if `ctx`
    /// ends before the installation reports the version.
    pub async fn set_version(
        &self,
        ctx: &CallContext,
        installation_id: &str,
        version: &str,
    ) -> Result<AppInstallation> {
        let current = self.read(ctx, installation_id).await?;
        if app_version_ready(&current, version).is_ok() {
            info!("App installation {installation_id} already runs version {version}");
            return Ok(current);
        }

        info!(
            "Requesting version {} for app installation {} (currently {})",
            version,
            installation_id,
            current.current_version.as_deref().unwrap_or("unknown")
        );
        self.api
            .request_app_version(ctx, installation_id, version)
            .await?;

        wait_for_app_version(
            ctx,
            Arc::clone(&self.api),
            installation_id,
            version,
            self.options,
        )
        .await
    }
}

impl std::fmt::Debug for AppInstallationResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppInstallationResource")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
