use proxy::ProxyError;
use thiserror::Error;
use withdrawal::IncidentKey;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to read chain heights: {0}")]
    Heights(#[source] ProxyError),

    #[error("failed to fetch withdrawal events in blocks [{from}, {to}]: {source}")]
    Scan {
        from: u64,
        to: u64,
        #[source]
        source: ProxyError,
    },

    #[error("failed to process withdrawal {key} proven in L1 block {block}: {source}")]
    Event {
        key: IncidentKey,
        block: u64,
        #[source]
        source: ProxyError,
    },
}

impl DetectorError {
    pub const fn proxy_error(&self) -> &ProxyError {
        match self {
            Self::Heights(source)
            | Self::Scan { source, .. }
            | Self::Event { source, .. } => source,
        }
    }

    /// False when the failure comes from inconsistent chain data rather than
    /// an unreachable node.
    pub fn is_transient(&self) -> bool {
        self.proxy_error().is_transient()
    }
}
