use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How many times an operation is re-run after the store reported being unavailable
    pub unavailable_retries: usize,

    /// How many fresh read-decide-write cycles a vote gets after losing a race
    pub conflict_retries: usize,

    /// Per-request timeout, to be enforced by the store transport
    pub request_timeout_secs: u64,

    /// Size of the notification batch fetched on refresh
    pub notification_limit: usize,

    /// Size of post listings
    pub post_limit: usize,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            unavailable_retries: 1,
            conflict_retries: 1,
            request_timeout_secs: 10,
            notification_limit: 50,
            post_limit: 20,
        }
    }
}
