use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisClientConfig {
    /// Prepended to queue names as `{key_prefix}:{name}`; empty means the bare name.
    pub key_prefix: String,
    /// Prepended to topic names the same way, for pub-sub channels.
    pub channel_prefix: String,
}

impl RedisClientConfig {
    pub fn list_key(&self, name: &str) -> String {
        prefixed(&self.key_prefix, name)
    }

    pub fn channel(&self, name: &str) -> String {
        prefixed(&self.channel_prefix, name)
    }
}

fn prefixed(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}:{name}")
    }
}
