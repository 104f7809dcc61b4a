//! A single OS pipe shared by a child's stdout and stderr, so the bytes a
//! subprocess writes to either stream land in the event log in the order the
//! kernel actually saw them. Two independently piped streams read by two
//! tasks racing into one channel cannot make that guarantee.

use std::io::{self, BufRead, BufReader};
use std::process::Stdio;

use os_pipe::{pipe, PipeReader};
use tokio::sync::mpsc::UnboundedSender;

/// One writer handle for the child's stdout, one for its stderr — both
/// backed by the same pipe — plus the read end to drain on the parent side.
pub fn make() -> io::Result<(PipeReader, Stdio, Stdio)> {
    let (reader, writer) = pipe()?;
    let writer2 = writer.try_clone()?;
    Ok((reader, writer.into(), writer2.into()))
}

/// Drain `reader` line-by-line on a dedicated OS thread, forwarding each
/// line to `tx`. `PipeReader` is a blocking handle, so this must never run
/// directly on the tokio runtime.
pub fn spawn_line_reader(reader: PipeReader, tx: UnboundedSender<String>) {
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}
