//! Key generation for (channel, model) counters.

use std::fmt;

use super::window::Dimension;

/// Namespace prefix for RPM lists in the remote store.
pub const RPM_PREFIX: &str = "channel:rpm:";
/// Namespace prefix for TPM counters in the remote store.
pub const TPM_PREFIX: &str = "channel:tpm:";
/// Namespace prefix for RPD counters in the remote store.
pub const RPD_PREFIX: &str = "channel:rpd:";

/// A key that uniquely identifies the counters of one (channel, model) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelModelKey {
    /// The upstream channel id
    pub channel_id: i64,
    /// The model name requests are routed for
    pub model: String,
}

impl ChannelModelKey {
    /// Create a new key.
    pub fn new(channel_id: i64, model: &str) -> Self {
        Self {
            channel_id,
            model: model.to_string(),
        }
    }

    /// Key under which `dimension` is stored in the remote store.
    ///
    /// Format: "channel:{rpm|tpm|rpd}:{channel_id}:{model}"
    pub fn store_key(&self, dimension: Dimension) -> String {
        let prefix = match dimension {
            Dimension::Rpm => RPM_PREFIX,
            Dimension::Tpm => TPM_PREFIX,
            Dimension::Rpd => RPD_PREFIX,
        };
        format!("{}{}", prefix, self)
    }
}

impl fmt::Display for ChannelModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.model)
    }
}
