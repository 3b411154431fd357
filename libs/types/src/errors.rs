//! Error taxonomy shared across the trading system
//!
//! Validation errors are rejected synchronously and never retried; they are
//! distinct from RPC timeouts (unknown remote outcome) and transport loss,
//! which live with the messaging layer.

use thiserror::Error;

/// Numeric parse and range errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("Value must be positive")]
    NotPositive,

    #[error("Value must not be negative")]
    Negative,
}

/// Order validation and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Order already in terminal state: {status}")]
    AlreadyTerminal { status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("-1.5".to_string());
        assert_eq!(err.to_string(), "Invalid price: -1.5");
    }

    #[test]
    fn test_numeric_error_display() {
        let err = NumericError::InvalidDecimal("abc".to_string());
        assert!(err.to_string().contains("abc"));
    }
}
