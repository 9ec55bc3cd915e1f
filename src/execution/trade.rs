//! Open-trade state machine: Open -> PartialFilled -> Closed, never reopens.

use crate::models::{Direction, ExecutedTrade, TradeStatus, TradingSignal};
use chrono::Utc;

pub fn open_trade(signal: &TradingSignal, quantity: f64) -> ExecutedTrade {
    ExecutedTrade {
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        entry_price: signal.entry_price,
        quantity,
        stop_loss: signal.stop_loss,
        tp1: signal.tp1,
        tp2: signal.tp2,
        status: TradeStatus::Open,
        partial_1_taken: false,
        current_price: signal.entry_price,
        current_pnl: 0.0,
        entry_time: Utc::now(),
        exit_time: None,
        exit_reason: None,
    }
}

/// Applies a price update to an open or partially-filled trade, returning
/// `true` if the trade closed as a result. Terminal once closed; this is
/// never called again for a closed trade (the caller removes it from the
/// open-trades table).
pub fn apply_price(trade: &mut ExecutedTrade, price: f64) -> bool {
    debug_assert_ne!(trade.status, TradeStatus::Closed);
    trade.update_price(price);

    if trade.is_at_stop_loss() {
        close(trade, price, "sl");
        return true;
    }
    if trade.is_at_tp2() {
        close(trade, price, "tp2");
        return true;
    }
    if !trade.partial_1_taken && trade.is_at_tp1() {
        trade.partial_1_taken = true;
        trade.status = TradeStatus::PartialFilled;
    }
    false
}

pub fn close(trade: &mut ExecutedTrade, exit_price: f64, reason: &str) {
    trade.status = TradeStatus::Closed;
    trade.exit_time = Some(Utc::now());
    trade.exit_reason = Some(reason.to_string());
    trade.current_price = exit_price;
}

pub fn stop_loss_take_profits(direction: Direction, entry: f64, atr: f64) -> (f64, f64, f64) {
    let sl_distance = 2.0 * atr;
    match direction {
        Direction::Long => (entry - sl_distance, entry + 1.5 * atr, entry + 3.0 * atr),
        Direction::Short => (entry + sl_distance, entry - 1.5 * atr, entry - 3.0 * atr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionTier;

    fn long_signal() -> TradingSignal {
        TradingSignal {
            symbol: "BTC/USDT".into(),
            direction: Direction::Long,
            entry_price: 42000.0,
            stop_loss: 41300.0,
            tp1: 42525.0,
            tp2: 43050.0,
            tier: ExecutionTier::Full,
            confidence: 90.0,
            score: 90.0,
            ai_metadata: None,
        }
    }

    #[test]
    fn partial_then_stop_loss_sequence() {
        let mut trade = open_trade(&long_signal(), 1.0);

        assert!(!apply_price(&mut trade, 42525.0));
        assert!(trade.partial_1_taken);
        assert_eq!(trade.status, TradeStatus::PartialFilled);

        assert!(!apply_price(&mut trade, 42000.0));
        assert_eq!(trade.status, TradeStatus::PartialFilled);

        assert!(apply_price(&mut trade, 41300.0));
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_reason.as_deref(), Some("sl"));
    }

    #[test]
    fn tp2_closes_directly_without_prior_partial() {
        let mut trade = open_trade(&long_signal(), 1.0);
        assert!(apply_price(&mut trade, 43100.0));
        assert_eq!(trade.exit_reason.as_deref(), Some("tp2"));
    }

    #[test]
    fn stop_loss_take_profit_mirrors_for_short() {
        let (sl, tp1, tp2) = stop_loss_take_profits(Direction::Short, 42000.0, 350.0);
        assert!(sl > 42000.0);
        assert!(tp1 < 42000.0 && tp1 > tp2);
    }
}
