//! Error taxonomy for every balance-affecting operation.

use uuid::Uuid;

/// Broad class of a [`LedgerError`], used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or missing input; rejected before any store access.
    Validation,
    /// Missing identity or insufficient privilege.
    Authorization,
    /// A state precondition failed after a read; nothing was written.
    Precondition,
    /// Lost race / constraint violation; retryable, nothing was written.
    Integrity,
    /// The store could not complete the commit.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidAmount { amount: i64 },
    InvalidInput(String),
    Unauthenticated,
    Forbidden,
    UserNotFound { user_id: Option<Uuid> },
    MarketNotFound { market_id: Uuid },
    InsufficientBalance { balance: i64, requested: i64 },
    /// Wager attempted on a market that is no longer open.
    MarketResolved { market_id: Uuid },
    /// Resolve attempted on a market whose outcome is already declared.
    AlreadyResolved { market_id: Uuid },
    NotResolved { market_id: Uuid },
    AlreadyClaimed { market_id: Uuid },
    NothingToClaim { market_id: Uuid },
    Conflict(String),
    Storage(String),
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAmount { .. } | Self::InvalidInput(_) => ErrorClass::Validation,
            Self::Unauthenticated | Self::Forbidden => ErrorClass::Authorization,
            Self::UserNotFound { .. }
            | Self::MarketNotFound { .. }
            | Self::InsufficientBalance { .. }
            | Self::MarketResolved { .. }
            | Self::AlreadyResolved { .. }
            | Self::NotResolved { .. }
            | Self::AlreadyClaimed { .. }
            | Self::NothingToClaim { .. } => ErrorClass::Precondition,
            Self::Conflict(_) => ErrorClass::Integrity,
            Self::Storage(_) => ErrorClass::Storage,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::MarketNotFound { .. } => "MARKET_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::MarketResolved { .. } => "MARKET_RESOLVED",
            Self::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            Self::NotResolved { .. } => "NOT_RESOLVED",
            Self::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            Self::NothingToClaim { .. } => "NOTHING_TO_CLAIM",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Integrity)
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount { amount } => {
                write!(f, "amount must be a positive integer (minor units), got {amount}")
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Forbidden => write!(f, "forbidden: admin only"),
            Self::UserNotFound { .. } => write!(f, "user not found"),
            Self::MarketNotFound { market_id } => write!(f, "market not found: {market_id}"),
            Self::InsufficientBalance { balance, requested } => write!(
                f,
                "insufficient balance: have {balance}, requested {requested}"
            ),
            Self::MarketResolved { .. } => write!(f, "market is resolved"),
            Self::AlreadyResolved { .. } => write!(f, "market already resolved"),
            Self::NotResolved { .. } => write!(f, "market not resolved"),
            Self::AlreadyClaimed { .. } => write!(f, "already claimed"),
            Self::NothingToClaim { .. } => write!(f, "nothing to claim"),
            Self::Conflict(msg) => write!(f, "concurrent update conflict: {msg}"),
            Self::Storage(msg) => write!(f, "store commit failed: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}
