// utags-store settings engine
// Serves the pinned/emoji tag lists derived from user settings. The
// settings UI owns writes; this crate only reads.

use std::sync::Arc;

use crate::database::Storage;
use crate::types::errors::StoreError;
use crate::types::settings::TagSettings;

/// Storage key of the persisted user settings.
pub const SETTINGS_KEY: &str = "extension.utags.settings";

/// Trait defining the read-only settings interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<TagSettings, StoreError>;
    fn pinned_tags(&self) -> &[String];
    fn emoji_tags(&self) -> &[String];
}

/// Settings engine reading [`TagSettings`] from storage.
pub struct SettingsEngine {
    storage: Arc<Storage>,
    settings: TagSettings,
}

impl SettingsEngine {
    /// Creates the engine with default settings; call `load` to read the
    /// persisted ones.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            settings: TagSettings::default(),
        }
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from storage. Missing settings yield defaults; a
    /// malformed blob is a serialization error.
    fn load(&mut self) -> Result<TagSettings, StoreError> {
        self.settings = match self.storage.get(SETTINGS_KEY)? {
            Some(blob) => serde_json::from_str(&blob)?,
            None => TagSettings::default(),
        };
        Ok(self.settings.clone())
    }

    fn pinned_tags(&self) -> &[String] {
        &self.settings.pinned_tags
    }

    fn emoji_tags(&self) -> &[String] {
        &self.settings.emoji_tags
    }
}
