use crate::transport::WireRequest;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a wire request for in-flight deduplication.
///
/// Two requests are identical when method, URL and body bytes match. Headers are
/// not part of the identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey([u8; 32]);

impl RequestKey {
    pub fn of(request: &WireRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.method.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.url.as_bytes());
        hasher.update([0u8]);
        if let Some(body) = &request.body {
            hasher.update(body);
        }
        Self(hasher.finalize().into())
    }

    /// First eight bytes in hex, enough to correlate log lines.
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestKey({})", self.short())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}
