//! Market records: session header, trade prints, order lifecycle events.
//!
//! These are the in-memory forms shared by the parser, the merger and the
//! simulator. The on-disk layout, including the next-record tag every record
//! carries, lives in [`crate::stream`].
use std::fmt;

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};
use crate::moment::Moment;

/// Maximum symbol length stored in the event file header.
pub const SYMBOL_LEN: usize = 16;

/// Type tag of the record that follows on disk; `End` terminates the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RecordKind {
    End = 0,
    Trade = 1,
    Order = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    symbol: String,
    date: Moment,
}

impl Header {
    /// Fails when the symbol does not fit the 16-byte header field.
    pub fn new(symbol: impl Into<String>, date: Moment) -> Result<Self> {
        let symbol = symbol.into();
        if symbol.len() > SYMBOL_LEN {
            return Err(Error::format("header symbol", symbol));
        }
        Ok(Self {
            symbol,
            date: date.date_only(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn date(&self) -> Moment {
        self.date
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self.date;
        write!(f, "{} {:04}-{:02}-{:02}", self.symbol, date.year(), date.month(), date.day())
    }
}

/// Trade indicator of a print that was later cancelled by the exchange.
pub const TRADE_CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub number: u64,
    pub price: f64,
    pub quantity: u64,
    pub moment: Moment,
    /// 0 for a regular print, 2 for a cancelled one; other codes are kept as-is.
    pub indicator: u8,
    pub buy_number: u64,
    pub sell_number: u64,
}

impl Trade {
    pub fn is_cancelled(&self) -> bool {
        self.indicator == TRADE_CANCELLED
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TRADE #{} {:.3} x {}", self.moment, self.number, self.price, self.quantity)?;
        if self.is_cancelled() {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Side {
    Buy = 1,
    Sell = 2,
}

/// Lifecycle event type; codes outside the known set are kept in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OrderEvent {
    New = 1,
    Update = 2,
    Cancel = 3,
    Trade = 4,
    Reentry = 5,
    NewStopPrice = 6,
    Reject = 7,
    Remove = 8,
    StopPriceTriggered = 9,
    Expired = 11,
    #[num_enum(catch_all)]
    Other(u8),
}

/// Order status as the exchange reports it, one ASCII character on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OrderStatus {
    New = 48,             // '0'
    PartiallyTraded = 49, // '1'
    Traded = 50,          // '2'
    Cancelled = 52,       // '4'
    Modified = 53,        // '5'
    Rejected = 56,        // '8'
    Expired = 67,         // 'C'
    #[num_enum(catch_all)]
    Other(u8),
}

impl OrderStatus {
    /// Orders in a terminal status never rest on the book. Unknown statuses
    /// are not terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Traded | Self::Cancelled | Self::Rejected | Self::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Aggressor {
    Neutral = 0,
    Aggressor = 1,
    Receptor = 2,
    #[num_enum(catch_all)]
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub number: u64,
    pub side: Side,
    pub event: OrderEvent,
    pub moment: Moment,
    /// Exchange sequencing value; secondary chronological key, not book rank.
    pub priority: u64,
    pub price: f64,
    pub quantity: u64,
    pub traded: u64,
    /// Last update of the order as reported by the exchange.
    pub datetime: Moment,
    pub status: OrderStatus,
    pub aggressor: Aggressor,
    pub member: u64,
}

impl Order {
    pub fn remaining(&self) -> u64 {
        self.quantity.saturating_sub(self.traded)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_resting(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ORDER #{} {:?} {:?} {:.3} x [{}/{}] {:?}",
            self.moment,
            self.number,
            self.side,
            self.event,
            self.price,
            self.traded,
            self.quantity,
            self.status
        )
    }
}

/// One entry of the chronological event log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Trade(Trade),
    Order(Order),
}

impl Event {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Trade(_) => RecordKind::Trade,
            Self::Order(_) => RecordKind::Order,
        }
    }

    pub fn moment(&self) -> Moment {
        match self {
            Self::Trade(t) => t.moment,
            Self::Order(o) => o.moment,
        }
    }

    /// Trade number or order number.
    pub fn number(&self) -> u64 {
        match self {
            Self::Trade(t) => t.number,
            Self::Order(o) => o.number,
        }
    }
}

impl From<Trade> for Event {
    fn from(trade: Trade) -> Self {
        Self::Trade(trade)
    }
}

impl From<Order> for Event {
    fn from(order: Order) -> Self {
        Self::Order(order)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trade(t) => t.fmt(f),
            Self::Order(o) => o.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_ascii() {
        assert_eq!(OrderStatus::from(b'C'), OrderStatus::Expired);
        assert_eq!(u8::from(OrderStatus::Cancelled), b'4');
        assert_eq!(OrderStatus::from(b'3'), OrderStatus::Other(b'3'));
        assert!(!OrderStatus::Other(b'3').is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = [b'0', b'1', b'2', b'4', b'5', b'8', b'C']
            .into_iter()
            .map(OrderStatus::from)
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                OrderStatus::Traded,
                OrderStatus::Cancelled,
                OrderStatus::Rejected,
                OrderStatus::Expired
            ]
        );
    }

    #[test]
    fn unlisted_codes_are_kept_verbatim() {
        assert_eq!(OrderEvent::from(11), OrderEvent::Expired);
        assert_eq!(OrderEvent::from(10), OrderEvent::Other(10));
        assert_eq!(u8::from(OrderEvent::Other(12)), 12);
        assert_eq!(u8::from(Aggressor::from(3)), 3);
        assert!(Side::try_from(3).is_err());
    }

    #[test]
    fn header_symbol_limit() {
        let date = Moment::new(2017, 5, 17, 10, 0, 0, 0);
        let h = Header::new("WDOM17", date).unwrap();
        assert_eq!(h.date(), Moment::date(2017, 5, 17));
        assert_eq!(h.to_string(), "WDOM17 2017-05-17");
        assert!(Header::new("A".repeat(17), date).is_err());
    }
}
