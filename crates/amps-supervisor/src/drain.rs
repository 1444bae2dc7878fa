//! Background draining of a process's diagnostic output.
//!
//! A drainer owns the read end of the child's stderr. It ends when the read
//! returns end-of-stream, which happens once the process exits or the pipe is
//! closed, so no cancellation token is needed.
//!
//! Lines end at `\n` or `\r`. ffmpeg rewrites its progress line in place with
//! a bare carriage return, so splitting on newlines alone would hold every
//! progress update back until the process exits. Blank segments (such as the
//! empty one between `\r` and `\n`) are skipped, and a line longer than
//! [`MAX_LINE_BYTES`] is forwarded in pieces.

use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Tracing target used for forwarded transcoder output.
pub const FFMPEG_LOG_TARGET: &str = "ffmpeg";

/// Longest line forwarded in one piece.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Destination for drained diagnostic lines.
pub trait LogSink: Send + Sync + Debug {
    /// Handle one line, already stripped of surrounding whitespace.
    fn line(&self, stream_name: &str, line: &str);
}

/// Forwards lines to `tracing` under the `ffmpeg` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, stream_name: &str, line: &str) {
        tracing::info!(target: FFMPEG_LOG_TARGET, stream = %stream_name, "[{}] {}", stream_name, line);
    }
}

/// Spawn a task that forwards every line of `reader` to `sink`.
///
/// The task resolves to the number of lines forwarded. Invalid UTF-8 is
/// replaced rather than ending the drain.
pub fn spawn_drainer<R>(stream_name: String, reader: R, sink: Arc<dyn LogSink>) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::with_capacity(256);
        let mut forwarded = 0usize;

        loop {
            let (consumed, complete) = match reader.fill_buf().await {
                Ok([]) => break,
                Ok(available) => {
                    let room = MAX_LINE_BYTES - line.len();
                    match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                        Some(end) if end <= room => {
                            line.extend_from_slice(&available[..end]);
                            (end + 1, true)
                        }
                        _ => {
                            let take = available.len().min(room);
                            line.extend_from_slice(&available[..take]);
                            (take, line.len() >= MAX_LINE_BYTES)
                        }
                    }
                }
                Err(e) => {
                    debug!("stderr read for '{}' failed: {}", stream_name, e);
                    break;
                }
            };
            reader.consume(consumed);

            if complete {
                forwarded += forward(&stream_name, &line, sink.as_ref());
                line.clear();
            }
        }
        forwarded += forward(&stream_name, &line, sink.as_ref());

        debug!("Log drainer for '{}' finished after {} lines", stream_name, forwarded);
        forwarded
    })
}

/// Send one raw line to the sink unless it is blank. Returns lines sent.
fn forward(stream_name: &str, raw: &[u8], sink: &dyn LogSink) -> usize {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    sink.line(stream_name, text);
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct VecSink(Mutex<Vec<(String, String)>>);

    impl LogSink for VecSink {
        fn line(&self, stream_name: &str, line: &str) {
            self.0.lock().push((stream_name.to_string(), line.to_string()));
        }
    }

    #[tokio::test]
    async fn test_forwards_lines_in_order() {
        let sink = Arc::new(VecSink::default());
        let input: &[u8] = b"first\nsecond  \r\nthird";

        let count = spawn_drainer("cam".to_string(), input, sink.clone())
            .await
            .unwrap();

        assert_eq!(count, 3);
        let lines = sink.0.lock().clone();
        assert_eq!(
            lines,
            vec![
                ("cam".to_string(), "first".to_string()),
                ("cam".to_string(), "second".to_string()),
                ("cam".to_string(), "third".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let sink = Arc::new(VecSink::default());
        let input: &[u8] = b"ok\n\xff\xfe bad\n";

        let count = spawn_drainer("cam".to_string(), input, sink.clone())
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert!(sink.0.lock()[1].1.ends_with("bad"));
    }

    #[tokio::test]
    async fn test_ends_when_writer_closes() {
        let sink = Arc::new(VecSink::default());
        let (mut writer, reader) = tokio::io::duplex(64);

        let drainer = spawn_drainer("cam".to_string(), reader, sink.clone());

        use tokio::io::AsyncWriteExt;
        writer.write_all(b"one\ntwo\n").await.unwrap();
        drop(writer);

        let count = tokio::time::timeout(std::time::Duration::from_secs(1), drainer)
            .await
            .expect("drainer did not finish")
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_carriage_return_progress_is_forwarded_while_running() {
        let sink = Arc::new(VecSink::default());
        let (mut writer, reader) = tokio::io::duplex(1024);
        let drainer = spawn_drainer("cam".to_string(), reader, sink.clone());

        use tokio::io::AsyncWriteExt;
        for frame in 1..=200 {
            let record = format!("frame={frame} fps=25 q=-1.0 size=1024kB time=00:00:08.00 bitrate=1048.6kbits/s\r");
            writer.write_all(record.as_bytes()).await.unwrap();
        }

        // Progress is visible before the process closes its stderr.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while sink.0.lock().len() < 200 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("progress lines were held back");

        drop(writer);
        let count = drainer.await.unwrap();
        assert_eq!(count, 200);

        let lines = sink.0.lock();
        assert!(lines[0].1.starts_with("frame=1 fps=25"));
        assert!(lines[199].1.starts_with("frame=200 fps=25"));
        assert!(lines.iter().all(|(_, line)| line.len() < 100));
    }

    #[tokio::test]
    async fn test_long_line_is_split() {
        let sink = Arc::new(VecSink::default());
        let mut input = vec![b'x'; MAX_LINE_BYTES * 2 + 10];
        input.extend_from_slice(b"\ntail\n");

        let count = spawn_drainer("cam".to_string(), std::io::Cursor::new(input), sink.clone())
            .await
            .unwrap();

        assert_eq!(count, 4);
        let lines = sink.0.lock();
        assert_eq!(lines[0].1.len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].1.len(), MAX_LINE_BYTES);
        assert_eq!(lines[2].1.len(), 10);
        assert_eq!(lines[3].1, "tail");
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let sink = Arc::new(VecSink::default());
        let input: &[u8] = b"\n\r\n  \nframe=1\r\r\n";

        let count = spawn_drainer("cam".to_string(), input, sink.clone())
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(sink.0.lock()[0].1, "frame=1");
    }
}
