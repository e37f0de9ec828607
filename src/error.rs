//! Error taxonomy shared by the parser, merger, codec and simulator.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A fixed-width field that could not be extracted or parsed.
    #[error("malformed {field} field {value:?}{}", opt_line(.line))]
    Format {
        field: &'static str,
        value: String,
        /// 1-based line of the dump file, when known.
        line: Option<usize>,
    },
    /// A symbol placeholder that cannot be resolved to a concrete contract.
    #[error("unsupported symbol wildcard {symbol:?}")]
    UnsupportedWildcard { symbol: String },
    /// A binary event file that is truncated or carries invalid values.
    #[error("corrupt event stream at byte {offset}: {reason}")]
    CorruptStream { offset: u64, reason: String },
    /// Two input events share the whole chronological sort key.
    #[error("duplicate event {key}")]
    DuplicateEvent { key: String },
    #[error("IO error: {source} while {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn opt_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" at line {line}"),
        None => String::new(),
    }
}

impl Error {
    pub fn format(field: &'static str, value: impl Into<String>) -> Self {
        Self::Format {
            field,
            value: value.into(),
            line: None,
        }
    }

    pub fn corrupt(offset: u64, reason: impl ToString) -> Self {
        Self::CorruptStream {
            offset,
            reason: reason.to_string(),
        }
    }

    pub fn io(source: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source,
            context: context.to_string(),
        }
    }

    /// Attaches a dump line number to a format error; other errors pass through.
    pub fn at_line(self, number: usize) -> Self {
        match self {
            Self::Format { field, value, .. } => Self::Format {
                field,
                value,
                line: Some(number),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_mentions_line() {
        let err = Error::format("trade price", "1x.0").at_line(7);
        assert_eq!(err.to_string(), "malformed trade price field \"1x.0\" at line 7");
    }

    #[test]
    fn at_line_keeps_other_kinds() {
        let err = Error::corrupt(25, "truncated order record").at_line(3);
        assert!(matches!(err, Error::CorruptStream { offset: 25, .. }));
    }
}
