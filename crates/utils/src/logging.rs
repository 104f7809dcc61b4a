use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_BACKUPS: u32 = 5;

/// A `logs/backend.log` writer that rotates to `.1`..`.5` once the active
/// file crosses 10 MiB, keeping at most 5 rotated generations.
#[derive(Clone)]
struct RotatingFile {
    inner: Arc<Mutex<RotatingFileInner>>,
}

struct RotatingFileInner {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotatingFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFileInner { path, file, written })),
        })
    }

    fn rotate(inner: &mut RotatingFileInner) -> io::Result<()> {
        for i in (1..MAX_BACKUPS).rev() {
            let from = backup_path(&inner.path, i);
            let to = backup_path(&inner.path, i + 1);
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        let first_backup = backup_path(&inner.path, 1);
        let _ = fs::rename(&inner.path, &first_backup);
        inner.file = OpenOptions::new().create(true).append(true).open(&inner.path)?;
        inner.written = 0;
        Ok(())
    }
}

fn backup_path(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.written >= MAX_FILE_BYTES {
            Self::rotate(&mut guard)?;
        }
        let n = guard.file.write(buf)?;
        guard.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize the global `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (default `info`), a human-readable stderr layer, and a
/// size-rotated file layer at `<state_dir>/logs/backend.log`.
pub fn init(backend_log_path: &Path) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_writer = RotatingFile::open(backend_log_path.to_path_buf())?;

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Last `lines` lines of `path`, oldest first; empty if `lines` is zero or
/// the file doesn't exist yet.
pub fn tail_file(path: &Path, lines: usize) -> Vec<String> {
    if lines == 0 {
        return Vec::new();
    }
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|l| l.to_string()).collect()
}
