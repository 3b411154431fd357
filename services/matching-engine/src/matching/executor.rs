//! Trade generation
//!
//! Stamps each match event with the next value of a monotonic sequence and
//! maps maker/taker onto the trade's buyer and seller slots.

use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// One side of a match, as the executor sees it
#[derive(Debug, Clone, Copy)]
pub struct MatchParty {
    pub order_id: OrderId,
    pub account_id: AccountId,
}

/// Match executor handling trade generation
pub struct MatchExecutor {
    sequence_counter: u64,
}

impl MatchExecutor {
    /// Create a new match executor with starting sequence number
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            sequence_counter: starting_sequence,
        }
    }

    /// Get next sequence number (monotonically increasing)
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_counter;
        self.sequence_counter += 1;
        seq
    }

    /// Move the counter past an externally observed sequence
    ///
    /// Used when rebuilding from persisted state so new trades never reuse
    /// a sequence number.
    pub fn advance_past(&mut self, sequence: u64) {
        if sequence >= self.sequence_counter {
            self.sequence_counter = sequence + 1;
        }
    }

    /// Generate a trade between the resting (maker) and incoming (taker)
    /// orders
    ///
    /// The execution price is the maker's price; `taker_side` decides which
    /// party lands in the buyer slot.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_trade(
        &mut self,
        symbol: Symbol,
        taker_side: Side,
        maker: MatchParty,
        taker: MatchParty,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Trade {
        assert!(quantity.is_positive(), "Trade quantity must be positive");

        let (buyer, seller) = match taker_side {
            Side::Buy => (taker, maker),
            Side::Sell => (maker, taker),
        };

        let sequence = self.next_sequence();

        Trade::new(
            sequence,
            symbol,
            buyer.order_id,
            seller.order_id,
            buyer.account_id,
            seller.account_id,
            price,
            quantity,
            timestamp,
        )
    }
}
