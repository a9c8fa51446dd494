//! Async stream log readers (non-UTF8-safe).
//!
//! The compute service (Python plus native ML extensions) can emit non-UTF8
//! bytes on stdout/stderr. Using `BufReader::lines()` would terminate the
//! reader task on invalid UTF-8, so lines are read as bytes and decoded
//! lossily.

use loralab_core::{LogLine, OutputStream, ProcessEvent, ProcessEventCallback};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pid: u32,
    stream_type: OutputStream,
    on_event: ProcessEventCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let line = decode_line(&buf);
                    debug!(pid = %pid, stream = stream_type.as_str(), "{}", line);
                    on_event(ProcessEvent::Output(LogLine::new(stream_type, line)));
                }
                Err(e) => {
                    debug!(pid = %pid, stream = stream_type.as_str(), error = %e, "log stream reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(pid = %pid, stream = stream_type.as_str(), "log stream reader task exiting");
    })
}

/// Strip the trailing `\n` / `\r\n` and decode lossily.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
