//! Fixed-width B3 dump parsing.
//!
//! A dump starts with one header line holding the session date and a record
//! count, followed by fixed-width record lines. Byte offsets below are the
//! exchange layout and must not change. Lines are handled as bytes so that a
//! non-UTF-8 byte in an unused column cannot shift the offsets.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::{Range, RangeFrom};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::moment::{self, Moment};
use crate::record::{Aggressor, Order, OrderEvent, OrderStatus, Side, Trade};

const HEADER_DATE: Range<usize> = 23..33;
const HEADER_COUNT: Range<usize> = 45..54;
/// The header count includes the header and trailer lines.
const HEADER_COUNT_OVERHEAD: u64 = 2;

const SYMBOL: Range<usize> = 11..61;

const TRADE_NUMBER: Range<usize> = 62..72;
const TRADE_PRICE: Range<usize> = 74..93;
const TRADE_QUANTITY: Range<usize> = 94..112;
const TRADE_TIME: Range<usize> = 113..125;
const TRADE_INDICATOR: Range<usize> = 126..127;
const TRADE_BUY_NUMBER: Range<usize> = 139..154;
const TRADE_SELL_NUMBER: Range<usize> = 184..199;

const ORDER_SIDE: Range<usize> = 62..63;
const ORDER_NUMBER: Range<usize> = 64..79;
const ORDER_EVENT: Range<usize> = 96..99;
const ORDER_TIME: Range<usize> = 100..115;
const ORDER_PRIORITY: Range<usize> = 116..126;
const ORDER_PRICE: Range<usize> = 128..147;
const ORDER_QUANTITY: Range<usize> = 148..166;
const ORDER_TRADED: Range<usize> = 167..185;
const ORDER_DATETIME: Range<usize> = 197..216;
const ORDER_STATUS: Range<usize> = 217..218;
const ORDER_AGGRESSOR: Range<usize> = 219..220;
const ORDER_MEMBER: RangeFrom<usize> = 221..;

/// Contract month letters, January first.
const MONTH_CODES: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];
/// Contract roots that roll monthly and can be written as `ROOT%`.
const MONTHLY_ROOTS: [&str; 2] = ["WDO", "DOL"];
const WILDCARD: char = '%';

/// Symbol requested by the caller, possibly a front-month placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolPattern {
    Exact(String),
    /// `ROOT%`: the contract of the month following the session date.
    FrontMonth(String),
}

impl SymbolPattern {
    pub fn exact(symbol: impl Into<String>) -> Self {
        Self::Exact(symbol.into())
    }

    /// Resolves the concrete symbol traded on `date`.
    pub fn resolve(&self, date: Moment) -> String {
        match self {
            Self::Exact(symbol) => symbol.clone(),
            Self::FrontMonth(root) => {
                let month = date.month() as usize;
                // month 12 rolls into January of the next year
                let year = date.year() as u32 + u32::from(month == 12);
                let letter = MONTH_CODES[month % 12];
                format!("{root}{letter}{:02}", year % 100)
            }
        }
    }
}

impl FromStr for SymbolPattern {
    type Err = Error;

    fn from_str(symbol: &str) -> Result<Self> {
        let symbol = symbol.trim();
        if !symbol.contains(WILDCARD) {
            return Ok(Self::Exact(symbol.to_owned()));
        }
        match symbol.strip_suffix(WILDCARD) {
            Some(root) if MONTHLY_ROOTS.contains(&root) => Ok(Self::FrontMonth(root.to_owned())),
            _ => Err(Error::UnsupportedWildcard { symbol: symbol.to_owned() }),
        }
    }
}

fn field<'a, R>(line: &'a [u8], range: R, name: &'static str) -> Result<&'a str>
where
    R: std::slice::SliceIndex<[u8], Output = [u8]>,
{
    line.get(range)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .map(str::trim)
        .ok_or_else(|| Error::format(name, String::from_utf8_lossy(line)))
}

fn number<T, R>(line: &[u8], range: R, name: &'static str) -> Result<T>
where
    T: FromStr,
    R: std::slice::SliceIndex<[u8], Output = [u8]>,
{
    let text = field(line, range, name)?;
    text.parse().map_err(|_| Error::format(name, text))
}

fn code<T, R>(line: &[u8], range: R, name: &'static str) -> Result<T>
where
    T: TryFrom<u8>,
    R: std::slice::SliceIndex<[u8], Output = [u8]>,
{
    let value: u8 = number(line, range, name)?;
    T::try_from(value).map_err(|_| Error::format(name, value.to_string()))
}

/// Session date and number of record lines declared by a dump header line.
pub fn parse_header(line: &[u8]) -> Result<(Moment, u64)> {
    let date = moment::parse_date(field(line, HEADER_DATE, "header date")?)?;
    let count: u64 = number(line, HEADER_COUNT, "header count")?;
    Ok((date, count.saturating_sub(HEADER_COUNT_OVERHEAD)))
}

/// Trimmed instrument symbol of a record line.
pub fn symbol(line: &[u8]) -> Result<&str> {
    field(line, SYMBOL, "symbol")
}

/// Parses a trade print; the date comes from the session header.
pub fn parse_trade(line: &[u8], session: Moment) -> Result<Trade> {
    Ok(Trade {
        number: number(line, TRADE_NUMBER, "trade number")?,
        price: number(line, TRADE_PRICE, "trade price")?,
        quantity: number(line, TRADE_QUANTITY, "trade quantity")?,
        moment: session.with_time(moment::parse_time(field(line, TRADE_TIME, "trade time")?)?),
        indicator: number(line, TRADE_INDICATOR, "trade indicator")?,
        buy_number: number(line, TRADE_BUY_NUMBER, "buy order number")?,
        sell_number: number(line, TRADE_SELL_NUMBER, "sell order number")?,
    })
}

/// Parses an order lifecycle record; the event date comes from the session header.
pub fn parse_order(line: &[u8], session: Moment) -> Result<Order> {
    Ok(Order {
        number: number(line, ORDER_NUMBER, "order number")?,
        side: code::<Side, _>(line, ORDER_SIDE, "order side")?,
        event: OrderEvent::from(number::<u8, _>(line, ORDER_EVENT, "order event")?),
        moment: session.with_time(moment::parse_time(field(line, ORDER_TIME, "order time")?)?),
        priority: number(line, ORDER_PRIORITY, "order priority")?,
        price: number(line, ORDER_PRICE, "order price")?,
        quantity: number(line, ORDER_QUANTITY, "order quantity")?,
        traded: number(line, ORDER_TRADED, "traded quantity")?,
        datetime: moment::parse_datetime(field(line, ORDER_DATETIME, "order datetime")?)?,
        status: status(line)?,
        aggressor: Aggressor::from(number::<u8, _>(line, ORDER_AGGRESSOR, "aggressor")?),
        member: number(line, ORDER_MEMBER, "member")?,
    })
}

fn status(line: &[u8]) -> Result<OrderStatus> {
    let text = field(line, ORDER_STATUS, "order status")?;
    text.bytes()
        .next()
        .map(OrderStatus::from)
        .ok_or_else(|| Error::format("order status", text))
}

/// A record type that can be read from a dump line.
pub trait DumpRecord: Sized {
    const KIND: &'static str;

    fn parse(line: &[u8], session: Moment) -> Result<Self>;
}

impl DumpRecord for Trade {
    const KIND: &'static str = "trade";

    fn parse(line: &[u8], session: Moment) -> Result<Self> {
        parse_trade(line, session)
    }
}

impl DumpRecord for Order {
    const KIND: &'static str = "order";

    fn parse(line: &[u8], session: Moment) -> Result<Self> {
        parse_order(line, session)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Log progress every this many record lines; 0 disables it.
    pub progress_every: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            progress_every: 50_000,
        }
    }
}

/// Records of one dump retained for the resolved symbol.
#[derive(Debug, Clone)]
pub struct Dump<T> {
    pub date: Moment,
    pub symbol: String,
    pub records: Vec<T>,
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(true)
}

/// Reads a whole dump, keeping the records of the symbol `pattern` resolves to
/// on the dump's session date. Any malformed line aborts the read.
pub fn read_dump<T: DumpRecord, R: BufRead>(
    mut reader: R,
    pattern: &SymbolPattern,
    options: &ParseOptions,
) -> Result<Dump<T>> {
    let mut line = Vec::new();
    if !read_line(&mut reader, &mut line).map_err(|e| Error::io(e, "reading dump header"))? {
        return Err(Error::format("header", ""));
    }
    let (date, amount) = parse_header(&line).map_err(|e| e.at_line(1))?;
    let symbol = pattern.resolve(date);
    debug!(kind = T::KIND, %symbol, %date, amount, "dump header");

    let mut records = Vec::new();
    for i in 0..amount {
        let line_number = i as usize + 2;
        let more = read_line(&mut reader, &mut line)
            .map_err(|e| Error::io(e, format!("reading dump line {line_number}")))?;
        if !more {
            return Err(Error::format("record count", format!("{amount} declared, {i} found")));
        }
        if symbol_matches(&line, &symbol) {
            records.push(T::parse(&line, date).map_err(|e| e.at_line(line_number))?);
        }
        if options.progress_every > 0 && (i + 1) % options.progress_every == 0 {
            info!(kind = T::KIND, lines = i + 1, "parsed lines...");
        }
    }
    info!(kind = T::KIND, %symbol, retained = records.len(), lines = amount, "dump parsed");
    Ok(Dump {
        date,
        symbol,
        records,
    })
}

fn symbol_matches(line: &[u8], symbol: &str) -> bool {
    matches!(self::symbol(line), Ok(s) if s == symbol)
}

pub fn open_dump<T: DumpRecord>(
    path: &Path,
    pattern: &SymbolPattern,
    options: &ParseOptions,
) -> Result<Dump<T>> {
    let file = File::open(path).map_err(|e| Error::io(e, format!("opening {}", path.display())))?;
    read_dump(BufReader::new(file), pattern, options)
}
