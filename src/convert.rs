//! Dump-to-event-file conversion: parse, merge, encode.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::merge::{DuplicatePolicy, merge};
use crate::moment::Moment;
use crate::parse::{Dump, ParseOptions, SymbolPattern, open_dump};
use crate::record::{Header, Order, Trade};
use crate::stream::EventWriter;

/// The three dumps of one trading session.
#[derive(Debug, Clone)]
pub struct DumpPaths {
    pub trades: PathBuf,
    pub buys: PathBuf,
    pub sells: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    pub parse: ParseOptions,
    pub duplicates: DuplicatePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub symbol: String,
    pub date: Moment,
    pub trades: usize,
    pub orders: usize,
    pub bytes: u64,
    pub crc32: u32,
}

/// Default event file name: `SYMBOL_YYYYMMDD.bin`.
pub fn default_target(symbol: &str, date: Moment) -> PathBuf {
    let (year, month, day) = (date.year(), date.month(), date.day());
    PathBuf::from(format!("{symbol}_{year:04}{month:02}{day:02}.bin"))
}

/// Parses the three dumps for `pattern` and writes the merged event log to
/// `target` (or [`default_target`] when `None`).
pub fn convert(
    paths: &DumpPaths,
    pattern: &SymbolPattern,
    target: Option<&Path>,
    options: &ConvertOptions,
) -> Result<(PathBuf, ConvertSummary)> {
    info!(path = %paths.trades.display(), "parsing trades");
    let trades: Dump<Trade> = open_dump(&paths.trades, pattern, &options.parse)?;
    // order dumps use the contract resolved from the trade session
    let resolved = SymbolPattern::exact(trades.symbol.clone());
    info!(path = %paths.buys.display(), "parsing buy orders");
    let buys: Dump<Order> = open_dump(&paths.buys, &resolved, &options.parse)?;
    info!(path = %paths.sells.display(), "parsing sell orders");
    let sells: Dump<Order> = open_dump(&paths.sells, &resolved, &options.parse)?;
    for (kind, date) in [("buy", buys.date), ("sell", sells.date)] {
        if date != trades.date {
            warn!(kind, %date, session = %trades.date, "order dump belongs to another session");
        }
    }

    let (symbol, date) = (trades.symbol, trades.date);
    let trade_count = trades.records.len();
    let order_count = buys.records.len() + sells.records.len();
    let events = merge(trades.records, buys.records, sells.records, options.duplicates)?;

    let target = target
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_target(&symbol, date));
    info!(path = %target.display(), events = events.len(), "composing event file");
    let header = Header::new(symbol.clone(), date)?;
    let progress_every = options.parse.progress_every;
    let (crc32, bytes) = write_atomically(&target, |path| {
        let mut writer = EventWriter::create(path, header)?;
        for event in &events {
            writer.write(event)?;
            let written = writer.events_written();
            if progress_every > 0 && written % progress_every == 0 {
                info!(events = written, bytes = writer.bytes_written(), "events written...");
            }
        }
        let (_, crc32, bytes) = writer.finish_with_checksum()?;
        Ok((crc32, bytes))
    })?;
    info!(bytes, crc32 = %format!("{crc32:#010x}"), "done");

    let summary = ConvertSummary {
        symbol,
        date,
        trades: trade_count,
        orders: order_count,
        bytes,
        crc32,
    };
    Ok((target, summary))
}

/// Runs `write` against a `.part` sibling of `target` and renames it into
/// place on success. On failure the partial file is removed and `target` is
/// left untouched.
fn write_atomically<T>(target: &Path, write: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let mut partial = target.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    match write(&partial) {
        Ok(value) => {
            fs::rename(&partial, target)
                .map_err(|e| Error::io(e, format!("moving event file to {}", target.display())))?;
            Ok(value)
        }
        Err(err) => {
            match fs::remove_file(&partial) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    warn!(path = %partial.display(), error = %e, "partial event file left behind");
                }
                _ => {}
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.bin");
        let err = write_atomically(&target, |path| {
            fs::write(path, b"half a record").map_err(|e| Error::io(e, "writing"))?;
            Err::<(), _>(Error::io(io::Error::other("disk full"), "writing event file"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_write_keeps_previous_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.bin");
        fs::write(&target, b"previous").unwrap();
        let result = write_atomically(&target, |_| Err::<(), _>(Error::corrupt(0, "interrupted")));
        assert!(result.is_err());
        assert_eq!(fs::read(&target).unwrap(), b"previous");
    }

    #[test]
    fn successful_write_is_moved_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.bin");
        let len = write_atomically(&target, |path| {
            fs::write(path, b"events").map_err(|e| Error::io(e, "writing"))?;
            Ok(6)
        })
        .unwrap();
        assert_eq!(len, 6);
        assert_eq!(fs::read(&target).unwrap(), b"events");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn default_target_name() {
        let path = default_target("WDOM17", Moment::date(2017, 5, 7));
        assert_eq!(path, PathBuf::from("WDOM17_20170507.bin"));
    }
}
