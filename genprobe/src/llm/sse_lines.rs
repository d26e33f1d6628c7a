use bytes::Bytes;

use crate::error::Result;

/// Reassembles lines from an event stream whose network chunks may split a
/// line, or a multi-byte character, anywhere
#[derive(Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk, returning every line it completed, without the newline
    pub fn process(&mut self, chunk: Bytes) -> Result<Vec<String>> {
        self.bytes.extend_from_slice(&chunk);

        let Some(last_newline) = self.bytes.iter().rposition(|b| *b == b'\n') else {
            return Ok(vec![]);
        };

        let rest = self.bytes.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.bytes, rest);
        let text = String::from_utf8(complete)?;

        Ok(text
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect())
    }

    /// Whatever is left once the stream has ended
    pub fn parse_remaining(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.bytes);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// The payload of a `data:` line, if it is one
pub fn data_payload(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim_start)
}
