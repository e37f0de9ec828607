//! Chronological merge of trade prints and both order sides into one log.
use std::fmt;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::{Event, Order, Trade};

/// Total order used for the event log. Field order is significant: orders
/// sort before trades at the same instant, then by exchange priority, then by
/// order or trade number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
    pub kind_rank: u8,
    pub secondary: u64,
    pub number: u64,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.kind_rank == 0 { "order" } else { "trade" };
        write!(
            f,
            "{kind} #{} at {:02}:{:02}:{:02}.{:06} (priority {})",
            self.number, self.hour, self.minute, self.second, self.microsecond, self.secondary
        )
    }
}

impl Event {
    pub fn sort_key(&self) -> SortKey {
        let (hour, minute, second, microsecond) = self.moment().time_key();
        let (kind_rank, secondary) = match self {
            Event::Order(o) => (0, o.priority),
            Event::Trade(_) => (1, 0),
        };
        SortKey {
            hour,
            minute,
            second,
            microsecond,
            kind_rank,
            secondary,
            number: self.number(),
        }
    }
}

/// What to do with two events carrying the same full sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    /// Keep both, in the order they appeared in the input.
    KeepInputOrder,
}

/// Merges the three streams of one session. Input order is trades, buys,
/// sells; the sort is stable so ties under [`DuplicatePolicy::KeepInputOrder`]
/// keep that order.
pub fn merge(
    trades: Vec<Trade>,
    buys: Vec<Order>,
    sells: Vec<Order>,
    policy: DuplicatePolicy,
) -> Result<Vec<Event>> {
    let mut events = Vec::with_capacity(trades.len() + buys.len() + sells.len());
    events.extend(trades.into_iter().map(Event::Trade));
    events.extend(buys.into_iter().map(Event::Order));
    events.extend(sells.into_iter().map(Event::Order));
    events.sort_by_key(Event::sort_key);

    let mut duplicates = 0usize;
    for pair in events.windows(2) {
        let key = pair[0].sort_key();
        if key != pair[1].sort_key() {
            continue;
        }
        match policy {
            DuplicatePolicy::Reject => {
                return Err(Error::DuplicateEvent {
                    key: key.to_string(),
                });
            }
            DuplicatePolicy::KeepInputOrder => duplicates += 1,
        }
    }
    if duplicates > 0 {
        warn!(duplicates, "events with identical sort keys kept in input order");
    }
    info!(events = events.len(), "events sorted");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moment::Moment;
    use crate::record::{Aggressor, OrderEvent, OrderStatus, Side};

    fn at(second: u8, microsecond: u32) -> Moment {
        Moment::new(2017, 5, 17, 10, 0, second, microsecond)
    }

    fn trade(number: u64, moment: Moment) -> Trade {
        Trade {
            number,
            price: 10.0,
            quantity: 1,
            moment,
            indicator: 0,
            buy_number: 1,
            sell_number: 2,
        }
    }

    fn order(number: u64, side: Side, priority: u64, moment: Moment) -> Order {
        Order {
            number,
            side,
            event: OrderEvent::New,
            moment,
            priority,
            price: 10.0,
            quantity: 1,
            traded: 0,
            datetime: moment,
            status: OrderStatus::New,
            aggressor: Aggressor::Neutral,
            member: 3,
        }
    }

    fn numbers(events: &[Event]) -> Vec<u64> {
        events.iter().map(Event::number).collect()
    }

    #[test]
    fn orders_before_trades_at_same_instant() {
        let events = merge(
            vec![trade(100, at(1, 0)), trade(101, at(0, 5))],
            vec![order(1, Side::Buy, 9, at(1, 0))],
            vec![order(2, Side::Sell, 1, at(0, 5))],
            DuplicatePolicy::Reject,
        )
        .unwrap();
        assert_eq!(numbers(&events), vec![2, 101, 1, 100]);
    }

    #[test]
    fn priority_then_number_break_ties() {
        let events = merge(
            vec![],
            vec![order(7, Side::Buy, 5, at(0, 0)), order(3, Side::Buy, 5, at(0, 0))],
            vec![order(9, Side::Sell, 4, at(0, 0))],
            DuplicatePolicy::Reject,
        )
        .unwrap();
        assert_eq!(numbers(&events), vec![9, 3, 7]);
    }

    #[test]
    fn microseconds_dominate_kind() {
        let trades = vec![trade(1, at(0, 1))];
        let buys = vec![order(2, Side::Buy, 0, at(0, 2))];
        let events = merge(trades, buys, vec![], DuplicatePolicy::Reject).unwrap();
        assert_eq!(numbers(&events), vec![1, 2]);
    }

    #[test]
    fn date_is_not_part_of_the_key() {
        let other_day = Moment::new(2017, 5, 16, 10, 0, 0, 0);
        let trades = vec![trade(1, at(0, 0))];
        let buys = vec![order(2, Side::Buy, 0, other_day)];
        let events = merge(trades, buys, vec![], DuplicatePolicy::Reject).unwrap();
        assert_eq!(numbers(&events), vec![2, 1]);
    }

    #[test]
    fn duplicates_are_rejected_by_default() {
        let mut filled = order(4, Side::Sell, 2, at(3, 0));
        filled.status = OrderStatus::Traded;
        let sells = vec![order(4, Side::Sell, 2, at(3, 0)), filled];
        let err = merge(vec![], vec![], sells, DuplicatePolicy::default()).unwrap_err();
        assert!(matches!(err, Error::DuplicateEvent { .. }));
    }

    #[test]
    fn duplicates_can_keep_input_order() {
        let mut filled = order(4, Side::Sell, 2, at(3, 0));
        filled.status = OrderStatus::Traded;
        let sells = vec![order(4, Side::Sell, 2, at(3, 0)), filled];
        let events = merge(vec![], vec![], sells, DuplicatePolicy::KeepInputOrder).unwrap();
        match events.as_slice() {
            [Event::Order(a), Event::Order(b)] => {
                assert_eq!(a.status, OrderStatus::New);
                assert_eq!(b.status, OrderStatus::Traded);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn merge_is_deterministic() {
        let input = || {
            (
                vec![trade(5, at(2, 0)), trade(6, at(2, 0))],
                vec![order(1, Side::Buy, 3, at(2, 0)), order(2, Side::Buy, 1, at(1, 0))],
                vec![order(3, Side::Sell, 3, at(2, 0))],
            )
        };
        let (t, b, s) = input();
        let first = merge(t, b, s, DuplicatePolicy::Reject).unwrap();
        let (t, b, s) = input();
        let second = merge(t, b, s, DuplicatePolicy::Reject).unwrap();
        assert_eq!(first, second);
        assert_eq!(numbers(&first), vec![2, 1, 3, 5, 6]);
    }
}
