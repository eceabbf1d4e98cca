use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{CoreError, RpcError};
use crate::series::Position;

/// The node RPC methods chainplot uses, with their arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NodeCall {
    BlockchainInfo,
    BlockCount,
    BlockHash(Position),
    Block(String),
    BlockHeader(String),
    BlockIndexStats { from: Position, count: u64 },
    RawTransaction(String),
}

impl NodeCall {
    pub(super) fn method(&self) -> &'static str {
        match self {
            Self::BlockchainInfo => "getblockchaininfo",
            Self::BlockCount => "getblockcount",
            Self::BlockHash(_) => "getblockhash",
            Self::Block(_) => "getblock",
            Self::BlockHeader(_) => "getblockheader",
            Self::BlockIndexStats { .. } => "getblockindexstats",
            Self::RawTransaction(_) => "getrawtransaction",
        }
    }

    pub(super) fn params(&self) -> Vec<Value> {
        match self {
            Self::BlockchainInfo | Self::BlockCount => Vec::new(),
            Self::BlockHash(height) => vec![json!(height)],
            Self::Block(hash) | Self::BlockHeader(hash) => vec![json!(hash), json!(true)],
            Self::BlockIndexStats { from, count } => vec![json!(from), json!(count)],
            Self::RawTransaction(txid) => vec![json!(txid), json!(true)],
        }
    }

    /// Height whose absence a failure of this call signals, for calls
    /// addressed by height.
    pub(super) fn height(&self) -> Option<Position> {
        match self {
            Self::BlockHash(height) => Some(*height),
            Self::BlockIndexStats { from, count } => Some(from + count),
            _ => None,
        }
    }

    pub(super) fn envelope(&self, id: u64) -> Value {
        json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": self.method(),
            "params": self.params(),
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

impl Reply {
    fn into_value(self) -> Result<Value, CoreError> {
        if self.error.is_null() {
            Ok(self.result)
        } else {
            Err(server_error(self.error))
        }
    }
}

/// `{"code", "message"}` errors become [`RpcError::ServerError`]; any other
/// shape is kept verbatim as an invalid response.
fn server_error(raw: Value) -> CoreError {
    let code = raw.get("code").and_then(Value::as_i64);
    let message = raw.get("message").and_then(Value::as_str);
    let err = match (code, message) {
        (Some(code), Some(message)) => RpcError::ServerError {
            code,
            message: message.to_owned(),
        },
        _ => RpcError::InvalidResponse(format!("unrecognized error object: {raw}")),
    };
    CoreError::Rpc(err)
}

/// The JSON-RPC value carried by an HTTP response. Nodes report call
/// errors with a JSON body on non-2xx statuses, so the body wins when it
/// holds an error object; otherwise a failed status becomes
/// [`RpcError::HttpStatus`].
pub(super) fn parse_reply(method: &str, status: StatusCode, body: &str) -> Result<Value, CoreError> {
    match serde_json::from_str::<Reply>(body) {
        Ok(reply) if status.is_success() || !reply.error.is_null() => reply.into_value(),
        _ if !status.is_success() => Err(CoreError::Rpc(RpcError::HttpStatus {
            status: status.as_u16(),
            body: body.trim().chars().take(MAX_ERROR_BODY).collect(),
        })),
        Ok(reply) => reply.into_value(),
        Err(e) => Err(CoreError::Rpc(RpcError::InvalidResponse(format!(
            "{method}: {e}; body={body}"
        )))),
    }
}

const MAX_ERROR_BODY: usize = 200;

/// Typed result of `method`; `null` counts as missing data.
pub(super) fn decode<T: DeserializeOwned>(method: &str, raw: Value) -> Result<T, CoreError> {
    if raw.is_null() {
        return Err(CoreError::InvalidData(format!("{method} returned null")));
    }
    serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidData(format!("unexpected {method} result: {e}")))
}
