use serde::{Deserialize, Serialize};

/// User settings consumed by the tagging layer.
///
/// Read-only from this crate's perspective: the settings UI writes them,
/// the store and suggestion code only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSettings {
    /// Tags pinned to the top of suggestion lists.
    #[serde(default)]
    pub pinned_tags: Vec<String>,
    /// Tags rendered as emoji pills.
    #[serde(default)]
    pub emoji_tags: Vec<String>,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            pinned_tags: Vec::new(),
            emoji_tags: vec![
                "👍".to_string(),
                "👎".to_string(),
                "❤️".to_string(),
                "⭐".to_string(),
                "🚫".to_string(),
            ],
        }
    }
}
