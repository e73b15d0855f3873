use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Line reader that is safe to poll from `tokio::select!`.
///
/// Partial lines survive a cancelled read in `pending`, and bytes are decoded
/// lossily so a stray non-UTF-8 byte does not end the stream.
pub(crate) struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// The next line without its terminator, or `None` at end of stream.
    /// A final unterminated line is still returned.
    pub(crate) async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
