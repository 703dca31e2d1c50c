//! Stream framing for the daemon's line protocol.
//!
//! The daemon writes answers as newline-terminated lines followed by the
//! prompt `ksysguardd>` (usually with a trailing space). Out-of-band text is
//! wrapped in a pair of ESC bytes and may appear anywhere in the stream,
//! including in the middle of an answer line. Reads can split any of these
//! structures at arbitrary byte positions:
//!
//! ```text
//! 3.2\n\x1bdisk almost full\x1bksysguardd>
//! ```
//!
//! [`Framer`] keeps the unterminated tail of every chunk and rescans it in
//! front of the next one, so feeding a stream one byte at a time yields
//! exactly the frames produced by feeding it whole.

use std::mem;

use tracing::warn;

const FRAMER_TARGET: &str = "sysguard_agent::framer";

const ESCAPE: u8 = 0x1b;
const PROMPT: &[u8] = b"ksysguardd>";
const RECONFIGURE: &str = "RECONFIGURE";

/// Held-back bytes beyond which the stream is reported as stuck.
const LEFTOVER_WARN_BYTES: usize = 64 * 1024;

/// Structural element recognised in the daemon's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A prompt marker; carries the lines received since the previous one.
    Prompt {
        /// Answer lines without their terminating newlines.
        lines: Vec<Vec<u8>>,
    },
    /// Out-of-band text meant for the user.
    Message(String),
    /// The daemon's sensor set changed.
    Reconfigure,
}

/// Incremental splitter turning byte chunks into [`Frame`]s.
#[derive(Debug, Default)]
pub struct Framer {
    leftover: Vec<u8>,
    answer: Vec<Vec<u8>>,
    swallow_space: bool,
    oversized: bool,
}

impl Framer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `chunk` and returns the frames it completes, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut buffer = mem::take(&mut self.leftover);
        buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        let mut cursor = 0;

        while let Some(&byte) = buffer.get(cursor) {
            if mem::take(&mut self.swallow_space) && byte == b' ' && cursor == line_start {
                cursor += 1;
                line_start = cursor;
                continue;
            }

            match byte {
                ESCAPE => {
                    let Some(end) = find_escape_end(&buffer, cursor) else {
                        break;
                    };
                    let text = buffer.get(cursor + 1..end).unwrap_or_default();
                    frames.push(classify(String::from_utf8_lossy(text).into_owned()));
                    buffer.drain(cursor..=end);
                    // The removed block may have split a prompt marker.
                    cursor = line_start;
                }
                b'\n' => {
                    let rest = buffer.get(cursor + 1..).unwrap_or_default();
                    if rest.starts_with(PROMPT) {
                        // The newline belongs to the marker that follows.
                        if line_start < cursor {
                            let line = buffer.get(line_start..cursor).unwrap_or_default();
                            self.answer.push(line.to_vec());
                        }
                    } else if PROMPT.starts_with(rest) {
                        break;
                    } else {
                        let line = buffer.get(line_start..cursor).unwrap_or_default();
                        self.answer.push(line.to_vec());
                    }
                    cursor += 1;
                    line_start = cursor;
                }
                _ if cursor == line_start => {
                    let rest = buffer.get(cursor..).unwrap_or_default();
                    if rest.starts_with(PROMPT) {
                        frames.push(Frame::Prompt {
                            lines: mem::take(&mut self.answer),
                        });
                        cursor += PROMPT.len();
                        line_start = cursor;
                        self.swallow_space = true;
                    } else if PROMPT.starts_with(rest) {
                        // Could still become a prompt once more bytes arrive.
                        break;
                    } else {
                        cursor += 1;
                    }
                }
                _ => cursor += 1,
            }
        }

        self.leftover = buffer.split_off(line_start.min(buffer.len()));
        self.check_leftover();
        frames
    }

    fn check_leftover(&mut self) {
        let oversized = self.leftover.len() > LEFTOVER_WARN_BYTES;
        if oversized && !self.oversized {
            warn!(
                target: FRAMER_TARGET,
                pending = self.leftover.len(),
                unterminated_escape = self.leftover.contains(&ESCAPE),
                "daemon output is piling up without a line or block boundary"
            );
        }
        self.oversized = oversized;
    }

    /// Drops every partial line, answer and escape block.
    pub fn reset(&mut self) {
        self.leftover.clear();
        self.answer.clear();
        self.swallow_space = false;
        self.oversized = false;
    }

    /// Bytes held back waiting for a boundary.
    #[must_use]
    pub fn pending_bytes(&self) -> &[u8] {
        &self.leftover
    }

    /// Number of complete lines collected for the answer in progress.
    #[must_use]
    pub fn pending_lines(&self) -> usize {
        self.answer.len()
    }
}

fn find_escape_end(buffer: &[u8], start: usize) -> Option<usize> {
    buffer
        .get(start + 1..)?
        .iter()
        .position(|&byte| byte == ESCAPE)
        .map(|offset| start + 1 + offset)
}

fn classify(text: String) -> Frame {
    if text.starts_with(RECONFIGURE) {
        Frame::Reconfigure
    } else {
        Frame::Message(text)
    }
}
