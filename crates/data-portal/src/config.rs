//! # Configuration
//!
//! [`PortalConfig`] bundles the collaborators every data-portal call needs:
//! the connection manager, the DAO builder, readers for the current user and
//! locale, and the behavior on denied access. It is built once and shared as
//! an `Arc` by every model instance.
//!
//! File-based settings live in [`PortalSettings`], read from a
//! `data-portal.json` found in the working directory or one of its parents.
//!
//! ```json
//! { "noAccessBehavior": "raise", "defaultDataSource": "orders", "locale": "hu-HU" }
//! ```

use crate::connection::{ConnectionManager, NoConnectionManager};
use crate::dao::DaoBuilder;
use crate::error::PortalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What happens when an authorization rule denies an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoAccessBehavior {
    /// Skip the operation and hand back the unchanged model.
    #[default]
    Skip,
    /// Like `Skip`, but log a warning.
    Warn,
    /// Fail with [`PortalError::AccessDenied`].
    Raise,
}

/// Settings that may come from a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalSettings {
    pub no_access_behavior: NoAccessBehavior,
    pub default_data_source: String,
    pub locale: Option<String>,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            no_access_behavior: NoAccessBehavior::Skip,
            default_data_source: "default".to_string(),
            locale: None,
        }
    }
}

impl PortalSettings {
    pub const FILE_NAME: &'static str = "data-portal.json";

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PortalError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = serde_json::from_str(&text)?;
        debug!(path = %path.as_ref().display(), "Loaded portal settings");
        Ok(settings)
    }

    /// Looks for the settings file in the working directory and its parents.
    /// Falls back to defaults when there is none.
    pub fn discover() -> Result<Self, PortalError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    pub fn discover_from(start: &Path) -> Result<Self, PortalError> {
        match Self::find_file(start) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn find_file(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(Self::FILE_NAME))
            .find(|candidate| candidate.is_file())
    }
}

pub type UserReader = Arc<dyn Fn() -> Option<String> + Send + Sync>;
pub type LocaleReader = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Runtime collaborators shared by all models.
pub struct PortalConfig {
    connection_manager: Arc<dyn ConnectionManager>,
    dao_builder: Arc<dyn DaoBuilder>,
    user_reader: UserReader,
    locale_reader: LocaleReader,
    no_access_behavior: NoAccessBehavior,
    default_data_source: String,
}

impl PortalConfig {
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::default()
    }

    pub fn connection_manager(&self) -> &dyn ConnectionManager {
        self.connection_manager.as_ref()
    }

    pub fn dao_builder(&self) -> &dyn DaoBuilder {
        self.dao_builder.as_ref()
    }

    pub fn current_user(&self) -> Option<String> {
        (self.user_reader)()
    }

    pub fn current_locale(&self) -> Option<String> {
        (self.locale_reader)()
    }

    pub fn no_access_behavior(&self) -> NoAccessBehavior {
        self.no_access_behavior
    }

    pub fn default_data_source(&self) -> &str {
        &self.default_data_source
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("no_access_behavior", &self.no_access_behavior)
            .field("default_data_source", &self.default_data_source)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct PortalConfigBuilder {
    connection_manager: Option<Arc<dyn ConnectionManager>>,
    dao_builder: Option<Arc<dyn DaoBuilder>>,
    user_reader: Option<UserReader>,
    locale_reader: Option<LocaleReader>,
    settings: PortalSettings,
}

impl PortalConfigBuilder {
    pub fn connection_manager(mut self, manager: Arc<dyn ConnectionManager>) -> Self {
        self.connection_manager = Some(manager);
        self
    }

    pub fn dao_builder(mut self, builder: Arc<dyn DaoBuilder>) -> Self {
        self.dao_builder = Some(builder);
        self
    }

    pub fn user_reader(mut self, reader: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        self.user_reader = Some(Arc::new(reader));
        self
    }

    pub fn locale_reader(
        mut self,
        reader: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.locale_reader = Some(Arc::new(reader));
        self
    }

    pub fn no_access_behavior(mut self, behavior: NoAccessBehavior) -> Self {
        self.settings.no_access_behavior = behavior;
        self
    }

    pub fn default_data_source(mut self, name: impl Into<String>) -> Self {
        self.settings.default_data_source = name.into();
        self
    }

    /// Applies file-based settings. Values set afterwards on the builder win.
    pub fn settings(mut self, settings: &PortalSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn build(self) -> Result<Arc<PortalConfig>, PortalError> {
        let dao_builder = self
            .dao_builder
            .ok_or_else(|| PortalError::Configuration("no DAO builder configured".into()))?;
        let locale = self.settings.locale.clone();
        Ok(Arc::new(PortalConfig {
            connection_manager: self
                .connection_manager
                .unwrap_or_else(|| Arc::new(NoConnectionManager)),
            dao_builder,
            user_reader: self.user_reader.unwrap_or_else(|| Arc::new(|| None)),
            locale_reader: self
                .locale_reader
                .unwrap_or_else(|| Arc::new(move || locale.clone())),
            no_access_behavior: self.settings.no_access_behavior,
            default_data_source: self.settings.default_data_source,
        }))
    }
}
