//! Tokenisers for `/proc` pseudo-files.
//!
//! These are pure functions over file content. They split text into the
//! whitespace tokens that [`FieldSet`](super::fields::FieldSet) indexes, and
//! extract the subject name from lines of files that interleave several
//! subjects (network interfaces, block devices, labelled values).

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Splits content into whitespace-delimited tokens.
pub fn tokenize(content: &str) -> Vec<String> {
    content.split_whitespace().map(str::to_string).collect()
}

/// Tokenises `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so it is taken as
/// everything between the first `(` and the last `)`. The result keeps the
/// kernel numbering: field N (1-based, per `man 5 proc`) is token N-1.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn tokenize_proc_stat(content: &str) -> Result<Vec<String>, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid = content[..open_paren].trim();
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new("invalid pid"));
    }

    let mut tokens = Vec::with_capacity(52);
    tokens.push(pid.to_string());
    tokens.push(content[open_paren + 1..close_paren].to_string());
    tokens.extend(content[close_paren + 1..].split_whitespace().map(str::to_string));

    Ok(tokens)
}

/// Splits a `/proc/net/dev` line into interface name and counter columns.
///
/// Header lines (containing `|`) and blank lines yield `None`.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn split_net_dev_line(line: &str) -> Option<(&str, Vec<String>)> {
    if line.contains('|') || line.trim().is_empty() {
        return None;
    }

    // Large counters can touch the colon ("eth0:987654321"), so split on it
    // rather than on whitespace.
    let (name, values) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    Some((name, tokenize(values)))
}

/// Splits a `/proc/diskstats` line into device name and the counter columns
/// following it.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged w_sectors w_time io_pending io_time w_io_time [discards ...]
pub fn split_diskstats_line(line: &str) -> Option<(&str, Vec<String>)> {
    let mut parts = line.split_whitespace();

    // Skip major, minor
    parts.next()?;
    parts.next()?;

    let name = parts.next()?;
    let values: Vec<String> = parts.map(str::to_string).collect();

    // Anything without the read/write sector columns is not a device line.
    if values.len() < 7 {
        return None;
    }

    Some((name, values))
}

/// Splits a `Key: value [unit]` line as found in `/proc/meminfo`,
/// `/proc/[pid]/status` and `/proc/[pid]/io`.
pub fn split_labeled_line(line: &str) -> Option<(&str, Vec<String>)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    Some((key, tokenize(value)))
}
