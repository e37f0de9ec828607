//! Binary event file: a header followed by a tag-linked chain of trade and
//! order records.
//!
//! Every record is fixed size and carries the [`RecordKind`] of the record
//! after it, so the reader never needs lengths or delimiters. Records are
//! serialized with `bincode` using fixed-width integers in little-endian
//! order:
//!
//! | record | bytes | layout                                                    |
//! |--------|-------|-----------------------------------------------------------|
//! | header | 25    | symbol `[u8; 16]`, date `u64`, next `u8`                  |
//! | trade  | 50    | number, price `f64`, quantity, moment, indicator `u8`,    |
//! |        |       | buy, sell, next                                           |
//! | order  | 69    | number, side `u8`, event `u8`, moment, priority, price,   |
//! |        |       | quantity, traded, datetime, status `u8`, aggressor `u8`,  |
//! |        |       | member, next                                              |
//!
//! Moments are stored packed (see [`Moment::pack`]).
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::Options;
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::moment::Moment;
use crate::record::{
    Aggressor, Event, Header, Order, OrderEvent, OrderStatus, RecordKind, SYMBOL_LEN, Side, Trade,
};

pub const HEADER_SIZE: u64 = 25;
pub const TRADE_SIZE: u64 = 50;
pub const ORDER_SIZE: u64 = 69;

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().with_little_endian()
}

#[derive(Debug, Serialize, Deserialize)]
struct HeaderWire {
    symbol: [u8; SYMBOL_LEN],
    date: u64,
    next: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct TradeWire {
    number: u64,
    price: f64,
    quantity: u64,
    moment: u64,
    indicator: u8,
    buy_number: u64,
    sell_number: u64,
    next: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderWire {
    number: u64,
    side: u8,
    event: u8,
    moment: u64,
    priority: u64,
    price: f64,
    quantity: u64,
    traded: u64,
    datetime: u64,
    status: u8,
    aggressor: u8,
    member: u64,
    next: u8,
}

impl HeaderWire {
    fn new(header: &Header, next: RecordKind) -> Self {
        let mut symbol = [0u8; SYMBOL_LEN];
        let bytes = header.symbol().as_bytes();
        symbol[..bytes.len()].copy_from_slice(bytes);
        Self { symbol, date: header.date().pack(), next: next.into() }
    }

    fn into_header(self, offset: u64) -> Result<Header> {
        let end = self.symbol.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
        let symbol =
            std::str::from_utf8(&self.symbol[..end]).map_err(|e| Error::corrupt(offset, e))?;
        Header::new(symbol.trim_end(), Moment::unpack(self.date))
    }
}

impl TradeWire {
    fn new(t: &Trade, next: RecordKind) -> Self {
        Self {
            number: t.number,
            price: t.price,
            quantity: t.quantity,
            moment: t.moment.pack(),
            indicator: t.indicator,
            buy_number: t.buy_number,
            sell_number: t.sell_number,
            next: next.into(),
        }
    }

    fn into_trade(self) -> Trade {
        Trade {
            number: self.number,
            price: self.price,
            quantity: self.quantity,
            moment: Moment::unpack(self.moment),
            indicator: self.indicator,
            buy_number: self.buy_number,
            sell_number: self.sell_number,
        }
    }
}

fn wire_code<T: TryFrom<u8>>(value: u8, name: &str, offset: u64) -> Result<T> {
    T::try_from(value).map_err(|_| Error::corrupt(offset, format!("invalid {name} code {value}")))
}

impl OrderWire {
    fn new(o: &Order, next: RecordKind) -> Self {
        Self {
            number: o.number,
            side: o.side.into(),
            event: o.event.into(),
            moment: o.moment.pack(),
            priority: o.priority,
            price: o.price,
            quantity: o.quantity,
            traded: o.traded,
            datetime: o.datetime.pack(),
            status: o.status.into(),
            aggressor: o.aggressor.into(),
            member: o.member,
            next: next.into(),
        }
    }

    fn into_order(self, offset: u64) -> Result<Order> {
        Ok(Order {
            number: self.number,
            side: wire_code::<Side>(self.side, "side", offset)?,
            event: OrderEvent::from(self.event),
            moment: Moment::unpack(self.moment),
            priority: self.priority,
            price: self.price,
            quantity: self.quantity,
            traded: self.traded,
            datetime: Moment::unpack(self.datetime),
            status: OrderStatus::from(self.status),
            aggressor: Aggressor::from(self.aggressor),
            member: self.member,
        })
    }
}

/// Record held back until the kind of its successor is known.
enum Pending {
    Header(Header),
    Event(Event),
}

/// Writes an event file with a one-record lookahead so each record can carry
/// the kind of the next one.
pub struct EventWriter<W: Write> {
    inner: W,
    pending: Option<Pending>,
    hasher: Crc32,
    bytes: u64,
    events: u64,
}

impl<W: Write> EventWriter<W> {
    pub fn new(inner: W, header: Header) -> Self {
        Self {
            inner,
            pending: Some(Pending::Header(header)),
            hasher: Crc32::new(),
            bytes: 0,
            events: 0,
        }
    }

    pub fn write(&mut self, event: &Event) -> Result<()> {
        self.flush_pending(event.kind())?;
        self.pending = Some(Pending::Event(*event));
        self.events += 1;
        Ok(())
    }

    fn flush_pending(&mut self, next: RecordKind) -> Result<()> {
        let options = wire_options();
        let payload = match self.pending.take() {
            Some(Pending::Header(h)) => options.serialize(&HeaderWire::new(&h, next)),
            Some(Pending::Event(Event::Trade(t))) => options.serialize(&TradeWire::new(&t, next)),
            Some(Pending::Event(Event::Order(o))) => options.serialize(&OrderWire::new(&o, next)),
            None => return Ok(()),
        }
        .map_err(|e| Error::io(io::Error::other(e), "encoding record"))?;
        self.hasher.update(&payload);
        self.inner.write_all(&payload).map_err(|e| Error::io(e, "writing event file"))?;
        self.bytes += payload.len() as u64;
        Ok(())
    }

    /// Bytes emitted so far; the last buffered record is not counted until
    /// [`finish`](Self::finish).
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn events_written(&self) -> u64 {
        self.events
    }

    /// Terminates the chain with tag 0 and flushes the writer.
    pub fn finish(self) -> Result<W> {
        self.finish_with_checksum().map(|(inner, _, _)| inner)
    }

    /// [`finish`](Self::finish) that also reports the CRC32 and length of the file.
    pub fn finish_with_checksum(mut self) -> Result<(W, u32, u64)> {
        self.flush_pending(RecordKind::End)?;
        self.inner.flush().map_err(|e| Error::io(e, "flushing event file"))?;
        Ok((self.inner, self.hasher.finalize(), self.bytes))
    }
}

impl EventWriter<BufWriter<File>> {
    pub fn create(path: &Path, header: Header) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::io(e, format!("creating {}", path.display())))?;
        Ok(Self::new(BufWriter::with_capacity(1 << 20, file), header))
    }
}

/// Writes `header` and `events` as one complete event file.
pub fn write_events<'a, W, I>(inner: W, header: Header, events: I) -> Result<W>
where
    W: Write,
    I: IntoIterator<Item = &'a Event>,
{
    let mut writer = EventWriter::new(inner, header);
    for event in events {
        writer.write(event)?;
    }
    writer.finish()
}

/// Reads an event file record by record, following the tag chain.
pub struct EventReader<R: Read> {
    inner: R,
    header: Header,
    next: RecordKind,
    offset: u64,
}

fn read_err(e: bincode::Error, offset: u64, what: &str) -> Error {
    match *e {
        bincode::ErrorKind::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            Error::corrupt(offset, format!("truncated {what} record"))
        }
        bincode::ErrorKind::Io(io) => {
            Error::io(io, format!("reading {what} record at byte {offset}"))
        }
        other => Error::corrupt(offset, other),
    }
}

fn next_kind(tag: u8, offset: u64) -> Result<RecordKind> {
    RecordKind::try_from(tag)
        .map_err(|_| Error::corrupt(offset, format!("invalid record tag {tag}")))
}

impl<R: Read> EventReader<R> {
    /// Decodes the header; the first event is read lazily.
    pub fn new(mut inner: R) -> Result<Self> {
        let wire: HeaderWire = wire_options()
            .deserialize_from(&mut inner)
            .map_err(|e| read_err(e, 0, "header"))?;
        let next = next_kind(wire.next, 0)?;
        let header = wire.into_header(0)?;
        Ok(Self {
            inner,
            header,
            next,
            offset: HEADER_SIZE,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Kind of the record that the next [`read_event`](Self::read_event) will decode.
    pub fn next_kind(&self) -> RecordKind {
        self.next
    }

    /// Returns `Ok(None)` once a record with tag 0 has been consumed. After an
    /// error the reader is exhausted.
    pub fn read_event(&mut self) -> Result<Option<Event>> {
        let result = self.decode_next();
        if result.is_err() {
            self.next = RecordKind::End;
        }
        result
    }

    fn decode_next(&mut self) -> Result<Option<Event>> {
        let offset = self.offset;
        let (event, tag) = match self.next {
            RecordKind::End => return Ok(None),
            RecordKind::Trade => {
                let wire: TradeWire = wire_options()
                    .deserialize_from(&mut self.inner)
                    .map_err(|e| read_err(e, offset, "trade"))?;
                self.offset += TRADE_SIZE;
                let tag = wire.next;
                (Event::Trade(wire.into_trade()), tag)
            }
            RecordKind::Order => {
                let wire: OrderWire = wire_options()
                    .deserialize_from(&mut self.inner)
                    .map_err(|e| read_err(e, offset, "order"))?;
                self.offset += ORDER_SIZE;
                let tag = wire.next;
                (Event::Order(wire.into_order(offset)?), tag)
            }
        };
        self.next = next_kind(tag, offset)?;
        Ok(Some(event))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl EventReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|e| Error::io(e, format!("opening {}", path.display())))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> Iterator for EventReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_event().transpose()
    }
}
