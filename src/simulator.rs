//! Forward-only replay of an event file into an [`OrderBook`].
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::Path;

use time::PrimitiveDateTime;
use tracing::{debug, info};

use crate::book::OrderBook;
use crate::error::{Error, Result};
use crate::moment::Moment;
use crate::record::{Event, Header, Order, Trade};
use crate::stream::EventReader;

/// Callbacks invoked after each event has been applied. Both default to doing
/// nothing; returning [`ControlFlow::Break`] stops the replay before the next
/// event.
pub trait ReplayHandler {
    fn on_trade(&mut self, _trade: &Trade, _book: &OrderBook) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_order(&mut self, _order: &Order, _book: &OrderBook) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl ReplayHandler for () {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub trades: u64,
    pub orders: u64,
    pub first: Option<Moment>,
    pub last: Option<Moment>,
    /// True when a handler stopped the replay before the end of the file.
    pub stopped: bool,
}

impl ReplayStats {
    pub fn events(&self) -> u64 {
        self.trades + self.orders
    }

    /// Wall-clock time covered by the replayed events, when both ends are
    /// valid calendar moments.
    pub fn span(&self) -> Option<time::Duration> {
        let first = PrimitiveDateTime::try_from(self.first?).ok()?;
        let last = PrimitiveDateTime::try_from(self.last?).ok()?;
        Some(last - first)
    }

    fn record(&mut self, event: &Event) {
        match event {
            Event::Trade(_) => self.trades += 1,
            Event::Order(_) => self.orders += 1,
        }
        let moment = event.moment();
        self.first.get_or_insert(moment);
        self.last = Some(moment);
    }
}

pub struct Simulator<R: Read> {
    reader: EventReader<R>,
    book: OrderBook,
    last_trade: Option<Trade>,
    last_order: Option<Order>,
}

impl Simulator<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_reader(EventReader::open(path)?))
    }
}

impl<R: Read> Simulator<R> {
    /// Reads the header from `inner`; events are consumed by [`step`](Self::step)
    /// or [`run`](Self::run).
    pub fn new(inner: R) -> Result<Self> {
        Ok(Self::from_reader(EventReader::new(inner)?))
    }

    fn from_reader(reader: EventReader<R>) -> Self {
        debug!(header = %reader.header(), "replay opened");
        Self {
            reader,
            book: OrderBook::new(),
            last_trade: None,
            last_order: None,
        }
    }

    pub fn header(&self) -> &Header {
        self.reader.header()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn last_trade(&self) -> Option<&Trade> {
        self.last_trade.as_ref()
    }

    pub fn last_order(&self) -> Option<&Order> {
        self.last_order.as_ref()
    }

    /// Decodes and applies one event. Returns `Ok(None)` at the end of the chain.
    pub fn step(&mut self) -> Result<Option<Event>> {
        let Some(event) = self.reader.read_event()? else {
            return Ok(None);
        };
        match event {
            Event::Trade(trade) => self.last_trade = Some(trade),
            Event::Order(order) => {
                self.last_order = Some(order);
                self.book.process(order);
            }
        }
        Ok(Some(event))
    }

    /// Replays the remaining events, calling `handler` after each one.
    pub fn run<H: ReplayHandler + ?Sized>(&mut self, handler: &mut H) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        while let Some(event) = self.step()? {
            stats.record(&event);
            let flow = match &event {
                Event::Trade(trade) => handler.on_trade(trade, &self.book),
                Event::Order(order) => handler.on_order(order, &self.book),
            };
            if flow.is_break() {
                stats.stopped = true;
                break;
            }
        }
        info!(
            symbol = self.header().symbol(),
            trades = stats.trades,
            orders = stats.orders,
            resting = self.book.resting_count(),
            stopped = stats.stopped,
            "replay finished"
        );
        Ok(stats)
    }
}

impl<R: Read + Seek> Simulator<R> {
    /// Restarts from the beginning of the file with an empty book.
    pub fn rewind(self) -> Result<Self> {
        let mut inner = self.reader.into_inner();
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io(e, "rewinding event file"))?;
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::record::{Aggressor, OrderEvent, OrderStatus, Side};
    use crate::stream::write_events;

    fn order(number: u64, second: u8, event: OrderEvent, status: OrderStatus) -> Event {
        let moment = Moment::new(2017, 5, 17, 10, 0, second, 0);
        Event::Order(Order {
            number,
            side: Side::Buy,
            event,
            moment,
            priority: number,
            price: 10.0,
            quantity: 5,
            traded: 0,
            datetime: moment,
            status,
            aggressor: Aggressor::Neutral,
            member: 7,
        })
    }

    fn trade(number: u64, second: u8) -> Event {
        Event::Trade(Trade {
            number,
            price: 10.0,
            quantity: 5,
            moment: Moment::new(2017, 5, 17, 10, 0, second, 0),
            indicator: 0,
            buy_number: 1,
            sell_number: 9,
        })
    }

    fn file(events: &[Event]) -> Cursor<Vec<u8>> {
        let header = Header::new("WDOM17", Moment::date(2017, 5, 17)).unwrap();
        Cursor::new(write_events(Vec::new(), header, events).unwrap())
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u64, usize)>,
        stop_after: Option<usize>,
    }

    impl Recorder {
        fn push(&mut self, number: u64, book: &OrderBook) -> ControlFlow<()> {
            self.seen.push((number, book.resting_count()));
            match self.stop_after {
                Some(n) if self.seen.len() >= n => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    impl ReplayHandler for Recorder {
        fn on_trade(&mut self, trade: &Trade, book: &OrderBook) -> ControlFlow<()> {
            self.push(trade.number, book)
        }

        fn on_order(&mut self, order: &Order, book: &OrderBook) -> ControlFlow<()> {
            self.push(order.number, book)
        }
    }

    fn session() -> Vec<Event> {
        vec![
            order(1, 0, OrderEvent::New, OrderStatus::New),
            order(2, 1, OrderEvent::New, OrderStatus::New),
            trade(100, 1),
            order(1, 2, OrderEvent::Trade, OrderStatus::Traded),
            order(2, 3, OrderEvent::Cancel, OrderStatus::Cancelled),
        ]
    }

    #[test]
    fn handlers_see_book_after_each_event() {
        let mut sim = Simulator::new(file(&session())).unwrap();
        let mut rec = Recorder::default();
        let stats = sim.run(&mut rec).unwrap();
        assert_eq!(rec.seen, vec![(1, 1), (2, 2), (100, 2), (1, 1), (2, 0)]);
        assert_eq!((stats.trades, stats.orders, stats.stopped), (1, 4, false));
        assert_eq!(stats.span(), Some(time::Duration::seconds(3)));
        assert_eq!(sim.last_trade().unwrap().number, 100);
        assert_eq!(sim.last_order().unwrap().status, OrderStatus::Cancelled);
        assert_eq!(sim.book().order(1).unwrap().status, OrderStatus::Traded);
    }

    #[test]
    fn handler_can_stop_between_events() {
        let mut sim = Simulator::new(file(&session())).unwrap();
        let mut rec = Recorder {
            stop_after: Some(2),
            ..Default::default()
        };
        let stats = sim.run(&mut rec).unwrap();
        assert!(stats.stopped);
        assert_eq!(stats.events(), 2);
        assert_eq!(sim.book().resting_count(), 2);
        // resuming continues from the next event
        let rest = sim.run(&mut ()).unwrap();
        assert_eq!(rest.events(), 3);
        assert_eq!(sim.book().resting_count(), 0);
    }

    #[test]
    fn rewind_starts_fresh() {
        let mut sim = Simulator::new(file(&session())).unwrap();
        sim.run(&mut ()).unwrap();
        let mut sim = sim.rewind().unwrap();
        assert!(sim.last_order().is_none());
        assert_eq!(sim.book().known_count(), 0);
        let first = sim.step().unwrap().unwrap();
        assert_eq!(first.number(), 1);
        assert_eq!(sim.book().resting_count(), 1);
    }

    #[test]
    fn corrupt_tail_aborts_run() {
        let mut bytes = file(&session()).into_inner();
        bytes.truncate(bytes.len() - 1);
        let mut sim = Simulator::new(Cursor::new(bytes)).unwrap();
        let err = sim.run(&mut ()).unwrap_err();
        assert!(matches!(err, Error::CorruptStream { .. }));
        assert_eq!(sim.book().order(1).unwrap().status, OrderStatus::Traded);
    }
}
