//! FFmpeg `-progress` stream parser
//!
//! ffmpeg writes blocks of `key=value` lines, one block per tick, each closed
//! by a `progress=continue` line and the last one by `progress=end`:
//!
//! ```text
//! frame=120
//! out_time_us=5000000
//! out_time_ms=5000000
//! out_time=00:00:05.000000
//! speed=2.01x
//! progress=continue
//! ```
//!
//! ## Elapsed-time keys
//!
//! - `out_time_ms` (and its alias `out_time_us`): integer **microseconds**,
//!   despite the name. Takes precedence when present with a valid value.
//! - `out_time`: `HH:MM:SS.ffffff`, used when the tick has no valid precise key.
//!
//! Malformed values (`N/A`, `NaN`, empty) are dropped for that tick only.
//! Negative values, which ffmpeg prints before the first packet, count as `0`.
//! Samples never go backwards: a tick older than the last emitted one is
//! discarded.

use std::io::{self, Read};
use tracing::trace;

pub const PRECISE_TIME_KEYS: &[&str] = &["out_time_ms", "out_time_us"];
pub const COARSE_TIME_KEY: &str = "out_time";
pub const PROGRESS_KEY: &str = "progress";
pub const PROGRESS_END: &str = "end";

const READ_CHUNK: usize = 8 * 1024;

/// Longest line kept while waiting for its terminator. Real progress lines
/// are a few dozen bytes; anything longer is dropped whole.
pub const MAX_LINE_BYTES: usize = 4 * 1024;

/// Elapsed output time at the end of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Seconds of output written so far.
    pub elapsed: f64,
    /// Set on the `progress=end` tick.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Between ticks.
    Idle,
    /// Inside a tick, collecting keys.
    Accumulating,
    /// `progress=end` seen; everything after it is ignored.
    Finished,
}

#[derive(Debug, Default)]
struct Tick {
    precise: Option<f64>,
    coarse: Option<f64>,
}

impl Tick {
    fn elapsed(&self) -> Option<f64> {
        self.precise.or(self.coarse)
    }
}

#[derive(Debug)]
pub struct ProgressParser {
    pending: Vec<u8>,
    /// The buffered line outgrew `MAX_LINE_BYTES`; skip to the next `\n`.
    overflowed: bool,
    state: ParserState,
    tick: Tick,
    last_elapsed: Option<f64>,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    /// Fresh parser in the `Idle` state with nothing buffered.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            overflowed: false,
            state: ParserState::Idle,
            tick: Tick::default(),
            last_elapsed: None,
        }
    }

    /// Where the parser is in the tick cycle.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// `progress=end` has been seen.
    pub fn is_finished(&self) -> bool {
        self.state == ParserState::Finished
    }

    /// Feed an arbitrary chunk of bytes. Incomplete trailing lines are kept
    /// until the rest arrives, up to `MAX_LINE_BYTES`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProgressSample> {
        let mut samples = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos + 1);
            rest = tail;
            if self.overflowed {
                self.overflowed = false;
                self.pending.clear();
                continue;
            }
            let sample = if self.pending.is_empty() {
                self.feed_line(&String::from_utf8_lossy(head))
            } else {
                self.pending.extend_from_slice(head);
                let line = std::mem::take(&mut self.pending);
                self.feed_line(&String::from_utf8_lossy(&line))
            };
            samples.extend(sample);
        }

        self.buffer_partial(rest);
        samples
    }

    fn buffer_partial(&mut self, bytes: &[u8]) {
        if self.overflowed || bytes.is_empty() {
            return;
        }
        if self.pending.len() + bytes.len() > MAX_LINE_BYTES {
            trace!(
                buffered = self.pending.len() + bytes.len(),
                "Dropping oversized progress line"
            );
            self.pending.clear();
            self.overflowed = true;
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Process whatever is left in the buffer as a final, unterminated line.
    pub fn flush(&mut self) -> Option<ProgressSample> {
        if std::mem::take(&mut self.overflowed) || self.pending.is_empty() {
            self.pending.clear();
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        self.feed_line(&String::from_utf8_lossy(&line))
    }

    /// Feed one complete line (with or without its line terminator).
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressSample> {
        if self.state == ParserState::Finished {
            return None;
        }

        let (key, value) = line.trim().split_once('=')?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            PROGRESS_KEY => self.close_tick(value == PROGRESS_END),
            k if PRECISE_TIME_KEYS.contains(&k) => {
                self.state = ParserState::Accumulating;
                match parse_microseconds(value) {
                    Some(secs) => self.tick.precise = Some(secs),
                    None => trace!(key = k, value, "Ignoring malformed progress value"),
                }
                None
            }
            COARSE_TIME_KEY => {
                self.state = ParserState::Accumulating;
                match parse_timestamp(value) {
                    Some(secs) => self.tick.coarse = Some(secs),
                    None => trace!(key, value, "Ignoring malformed progress value"),
                }
                None
            }
            _ => {
                self.state = ParserState::Accumulating;
                None
            }
        }
    }

    fn close_tick(&mut self, terminal: bool) -> Option<ProgressSample> {
        let tick = std::mem::take(&mut self.tick);
        self.state = if terminal {
            ParserState::Finished
        } else {
            ParserState::Idle
        };

        let elapsed = tick.elapsed()?;
        if let Some(last) = self.last_elapsed {
            if elapsed < last {
                trace!(elapsed, last, "Dropping retrograde progress tick");
                return None;
            }
        }
        self.last_elapsed = Some(elapsed);
        Some(ProgressSample { elapsed, terminal })
    }

    /// Drain `reader` to EOF, calling `on_sample` for each sample. Reading
    /// continues after `progress=end` so the writer never blocks.
    pub fn read_from<R, F>(&mut self, mut reader: R, mut on_sample: F) -> io::Result<()>
    where
        R: Read,
        F: FnMut(ProgressSample),
    {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            for sample in self.feed(&buf[..n]) {
                on_sample(sample);
            }
        }
        if let Some(sample) = self.flush() {
            on_sample(sample);
        }
        Ok(())
    }
}

fn parse_microseconds(value: &str) -> Option<f64> {
    let micros = value.parse::<i64>().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

/// `HH:MM:SS.ffffff`, optionally with a leading `-` (clamped to zero).
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let (negative, body) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let mut parts = body.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    if negative {
        return Some(0.0);
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn render(ticks: &[u64]) -> String {
        let mut out = String::new();
        for (i, us) in ticks.iter().enumerate() {
            out.push_str(&format!("frame={}\nout_time_ms={}\n", i, us));
            out.push_str("progress=continue\n");
        }
        out.push_str("progress=end\n");
        out
    }

    proptest! {
        /// Samples are non-decreasing whatever order the ticks arrive in.
        #[test]
        fn prop_samples_never_regress(ticks in proptest::collection::vec(0u64..10_000_000_000, 0..50)) {
            let mut parser = ProgressParser::new();
            let samples = parser.feed(render(&ticks).as_bytes());
            for pair in samples.windows(2) {
                prop_assert!(pair[0].elapsed <= pair[1].elapsed);
            }
        }

        /// A sorted stream comes out complete and unchanged.
        #[test]
        fn prop_sorted_stream_is_lossless(mut ticks in proptest::collection::vec(0u64..10_000_000_000, 0..50)) {
            ticks.sort_unstable();
            let mut parser = ProgressParser::new();
            let samples = parser.feed(render(&ticks).as_bytes());
            prop_assert_eq!(samples.len(), ticks.len());
            for (sample, us) in samples.iter().zip(&ticks) {
                prop_assert!((sample.elapsed - *us as f64 / 1_000_000.0).abs() < 1e-9);
            }
        }

        /// Chunk boundaries do not change the result.
        #[test]
        fn prop_chunking_is_transparent(
            ticks in proptest::collection::vec(0u64..1_000_000_000, 1..20),
            chunk in 1usize..64,
        ) {
            let text = render(&ticks);

            let mut whole = ProgressParser::new();
            let expected = whole.feed(text.as_bytes());

            let mut chunked = ProgressParser::new();
            let mut actual = Vec::new();
            for piece in text.as_bytes().chunks(chunk) {
                actual.extend(chunked.feed(piece));
            }
            actual.extend(chunked.flush());

            prop_assert_eq!(actual, expected);
        }
    }
}
