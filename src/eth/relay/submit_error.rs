use jsonrpsee::core::ClientError;

/// Failure of a destination chain write, classified at the chain client boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Timeouts, transport failures, nonce races, underpriced transactions.
    #[error("transient submission failure: {0}")]
    Transient(String),

    /// Destination contract already applied the transfer id.
    #[error("transfer already applied on destination: {0}")]
    AlreadyApplied(String),

    /// Revert or failed receipt for any other reason.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("unknown submission failure: {0}")]
    Unknown(String),
}

impl SubmitError {
    /// Short label used in logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::AlreadyApplied(_) => "already-applied",
            Self::Rejected(_) => "rejected",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Only an already applied transfer ends the retry loop early.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_))
    }

    /// Classifies a JSON-RPC client failure.
    pub fn from_client_error(e: ClientError) -> Self {
        match e {
            ClientError::Call(err) => {
                // revert data carries the Error(string) reason when the node provides it
                let reason = err
                    .data()
                    .and_then(|data| serde_json::from_str::<String>(data.get()).ok())
                    .and_then(|data| const_hex::decode(data).ok())
                    .and_then(|data| alloy_sol_types::decode_revert_reason(&data));
                let message = match reason {
                    Some(reason) => format!("{} ({})", err.message(), reason),
                    None => err.message().to_owned(),
                };
                Self::classify_message(err.code(), message)
            }
            ClientError::RequestTimeout => Self::Transient("request timeout".to_owned()),
            ClientError::Transport(e) => Self::Transient(format!("transport: {e}")),
            ClientError::RestartNeeded(e) => Self::Transient(format!("connection restart needed: {e}")),
            e => Self::Unknown(e.to_string()),
        }
    }

    /// Classifies an error message returned by a node or found in a revert reason.
    pub fn classify_message(code: i32, message: String) -> Self {
        let lower = message.to_lowercase();
        if ALREADY_APPLIED_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
            return Self::AlreadyApplied(message);
        }
        if TRANSIENT_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
            return Self::Transient(message);
        }
        // EIP-1474 code 3 is an execution revert
        if code == 3 || lower.contains("revert") {
            return Self::Rejected(message);
        }
        Self::Unknown(message)
    }
}

const ALREADY_APPLIED_PATTERNS: &[&str] = &[
    "already processed",
    "already applied",
    "already minted",
    "already released",
    "already executed",
    "transfer processed",
    "processed transfer",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "replacement transaction underpriced",
    "transaction underpriced",
    "already known",
    "timeout",
    "timed out",
    "rate limit",
    "too many requests",
    "header not found",
    "connection",
];
