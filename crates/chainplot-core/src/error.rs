use crate::series::Position;

/// JSON-RPC error codes that Bitcoin-derived nodes return for lookups past
/// the tip or for unknown block hashes.
const RPC_INVALID_PARAMETER: i64 = -8;
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// The node is still loading its block index.
const RPC_IN_WARMUP: i64 = -28;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON-RPC server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),

    /// Non-2xx HTTP response without a JSON-RPC body.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("RPC communication failure: {0}")]
    Rpc(#[from] RpcError),

    #[error("no data available at position {position}")]
    NotFound { position: Position },

    #[error("invalid data from source: {0}")]
    InvalidData(String),

    #[error("persisted series state is corrupt: {0}")]
    CorruptState(String),

    #[error("cannot roll back {window} points from a series with {points} points")]
    InsufficientHistory { points: usize, window: usize },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    ObserverUnavailable {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<CoreError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A web API outside the node (GitHub, CoinGecko) failed. `status` is
    /// absent when no response arrived.
    #[error("{service} request failed: {message}")]
    Api {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether a single observer call that failed with this error may be
    /// retried. Unknown heights, transport hiccups, server-side HTTP
    /// failures and a warming-up node are expected to clear up; anything
    /// else will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Rpc(RpcError::Transport(_)) => true,
            Self::Rpc(RpcError::ServerError { code, .. }) => *code == RPC_IN_WARMUP,
            Self::Rpc(RpcError::HttpStatus { status, .. }) => *status >= 500,
            // 202: GitHub is still computing statistics. 429: rate limited.
            Self::Api { status, .. } => {
                status.map_or(true, |s| s == 202 || s == 429 || s >= 500)
            }
            _ => false,
        }
    }
}

/// Map "height out of range" / "block not found" server errors for a lookup
/// at `position` onto the typed [`CoreError::NotFound`].
pub(crate) fn normalize_lookup_error(position: Position, err: CoreError) -> CoreError {
    match err {
        CoreError::Rpc(RpcError::ServerError { code, ref message })
            if is_not_found_server_error(code, message) =>
        {
            CoreError::NotFound { position }
        }
        other => other,
    }
}

fn is_not_found_server_error(code: i64, message: &str) -> bool {
    if code != RPC_INVALID_PARAMETER && code != RPC_INVALID_ADDRESS_OR_KEY {
        return false;
    }

    let msg = message.to_ascii_lowercase();
    msg.contains("out of range") || msg.contains("not found")
}
