// Copyright (c) 2005, 2022 Atif Aziz. All rights reserved.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Token-counting scan loop with periodic progress reports.

use std::{
    fmt::Display,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::json::{JsonTextReader, ReadError};

/// A progress report is emitted each time the count reaches a multiple of this.
pub const TOKENS_PER_REPORT: u64 = 1_000_000;

/// Default read-ahead buffer capacity (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub path: PathBuf,
    /// Capacity of the read-ahead buffer. Affects throughput only.
    pub buffer_size: usize,
}

impl ScanConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Progress {
    pub tokens: u64,
    pub elapsed: Duration,
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokens read: {} M in {:?}",
            self.tokens / TOKENS_PER_REPORT,
            self.elapsed
        )
    }
}

/// Outcome of a scan that reached the end of the stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub tokens: u64,
    pub elapsed: Duration,
}

impl Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tokens read: {} total in {:?}", self.tokens, self.elapsed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Error opening file: {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// `tokens` counts the valid tokens read before the fault.
    #[error("Error reading token: {source}")]
    Read {
        tokens: u64,
        #[source]
        source: ReadError,
    },
}

/// Opens `config.path` and counts its tokens, calling `on_progress` every
/// [`TOKENS_PER_REPORT`] tokens.
pub fn scan_file(
    config: &ScanConfig,
    on_progress: impl FnMut(Progress),
) -> Result<ScanSummary, ScanError> {
    let reader = open(&config.path, config.buffer_size)?;
    let summary = scan_reader(reader, on_progress)?;
    debug!(
        path = %config.path.display(),
        tokens = summary.tokens,
        elapsed = ?summary.elapsed,
        "scan complete"
    );
    Ok(summary)
}

fn open(path: &Path, buffer_size: usize) -> Result<BufReader<File>, ScanError> {
    let file = File::open(path).map_err(|source| ScanError::Open {
        path: path.to_owned(),
        source,
    })?;
    // A zero-capacity BufReader reports end of input on the first fill.
    let capacity = buffer_size.max(1);
    debug!(path = %path.display(), capacity, "opened input");
    Ok(BufReader::with_capacity(capacity, file))
}

/// Counts every token in `reader` until the end of the stream or the first
/// fault.
pub fn scan_reader<R: BufRead>(
    reader: R,
    mut on_progress: impl FnMut(Progress),
) -> Result<ScanSummary, ScanError> {
    let mut tokens = JsonTextReader::new(reader);
    let start = Instant::now();
    let mut count: u64 = 0;
    loop {
        match tokens.next_token() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(source) => {
                debug!(tokens = count, error = %source, "scan stopped at fault");
                return Err(ScanError::Read {
                    tokens: count,
                    source,
                });
            }
        }
        count += 1;
        if count % TOKENS_PER_REPORT == 0 {
            on_progress(Progress {
                tokens: count,
                elapsed: start.elapsed(),
            });
        }
    }
    Ok(ScanSummary {
        tokens: count,
        elapsed: start.elapsed(),
    })
}
