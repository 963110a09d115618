use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use tracing::debug;

use super::{Sink, SinkKind};
use crate::error::Result;
use crate::events::SystemEventKind;

const WRITE_BUFFER: usize = 8192;

/// Append-only daily logs: `messages_YYYYMMDD.log` and `system_YYYYMMDD.log`.
pub struct FileLogSink {
    dir: PathBuf,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn message_log_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("messages_{}.log", date.format("%Y%m%d")))
    }

    pub fn system_log_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("system_{}.log", date.format("%Y%m%d")))
    }

    /// `timestamp | MESSAGE | [sender |] text`
    pub fn format_message_line(at: &DateTime<Local>, text: &str, sender: Option<&str>) -> String {
        let ts = Self::timestamp(at);
        let text = single_line(text);
        match sender {
            Some(sender) => format!("{ts} | MESSAGE | {sender} | {text}"),
            None => format!("{ts} | MESSAGE | {text}"),
        }
    }

    /// `timestamp | KIND | detail`
    pub fn format_event_line(at: &DateTime<Local>, kind: SystemEventKind, detail: &str) -> String {
        format!("{} | {} | {}", Self::timestamp(at), kind, single_line(detail))
    }

    fn timestamp(at: &DateTime<Local>) -> String {
        at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    /// Append one line on the blocking pool.
    async fn append(&self, path: PathBuf, line: String) -> std::io::Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || append_line(&dir, &path, &line))
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Open, append one line, flush, close. The handle never outlives the call.
fn append_line(dir: &Path, path: &Path, line: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// One entry is one physical line: escape embedded line breaks.
fn single_line(text: &str) -> Cow<'_, str> {
    if text.contains(['\n', '\r']) {
        Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}

#[async_trait]
impl Sink for FileLogSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn deliver(&self, text: &str, sender: Option<&str>) -> Result<()> {
        let now = Local::now();
        let path = self.message_log_path(now.date_naive());
        self.append(path.clone(), Self::format_message_line(&now, text, sender))
            .await?;
        debug!("Message logged to {}", path.display());
        Ok(())
    }

    async fn deliver_event(&self, kind: SystemEventKind, detail: &str) -> Result<()> {
        let now = Local::now();
        let path = self.system_log_path(now.date_naive());
        self.append(path, Self::format_event_line(&now, kind, detail))
            .await?;
        Ok(())
    }
}
