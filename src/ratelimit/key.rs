//! Counter key generation and handling.

/// Key of one identity's counter for one window.
///
/// Rendered as `{prefix}:{identity}:{window_start}` where `window_start`
/// is in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Namespace shared by all counters of this limiter
    pub prefix: String,
    /// The caller identity the counter belongs to
    pub identity: String,
    /// Window start, epoch seconds
    pub window_start: u64,
}

impl CounterKey {
    pub fn new(prefix: &str, identity: &str, window_start: u64) -> Self {
        Self {
            prefix: prefix.to_string(),
            identity: identity.to_string(),
            window_start,
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.prefix, self.identity, self.window_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_format() {
        let key = CounterKey::new("rate", "u1", 1_700_000_040);
        assert_eq!(key.to_string(), "rate:u1:1700000040");
    }

    #[test]
    fn test_counter_key_keeps_colons_in_identity() {
        let key = CounterKey::new("rate", "2001:db8::1", 60);
        assert_eq!(key.to_string(), "rate:2001:db8::1:60");
    }
}
