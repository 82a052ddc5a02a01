//! カウンターファイルの読み書き。
//!
//! ファイルは 2 行のテキストで、1 行目がカウンター、2 行目が最終更新時刻 (RFC 3339)。
//!
//! ```text
//! 5
//! 2024-01-15T09:00:00-08:00
//! ```

use std::{
    fs, io,
    io::Write as _,
    path::{Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("counter file {path} is unavailable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("counter file {path} is malformed: {reason}")]
    MalformedState { path: PathBuf, reason: String },
    #[error("counter {counter} cannot be incremented any further")]
    CounterOverflow { counter: u64 },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// 永続化されるカウンターの状態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub counter: u64,
    /// 最後にカウンターを進めた時刻
    pub last_updated: DateTime<FixedOffset>,
}

impl CounterRecord {
    /// 初回実行時のレコード。
    pub fn initial(now: DateTime<FixedOffset>) -> Self {
        Self {
            counter: 0,
            last_updated: now,
        }
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut lines = content.trim().lines().map(str::trim);

        let counter = lines.next().filter(|l| !l.is_empty()).ok_or("missing counter line")?;
        if !counter.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid counter {counter:?}: expected decimal digits only"));
        }
        let counter = counter
            .parse::<u64>()
            .map_err(|e| format!("invalid counter {counter:?}: {e}"))?;

        let last_updated = lines.next().ok_or("missing timestamp line")?;
        let last_updated = DateTime::parse_from_rfc3339(last_updated)
            .map_err(|e| format!("invalid timestamp {last_updated:?}: {e}"))?;

        if lines.any(|l| !l.is_empty()) {
            return Err("unexpected content after timestamp line".to_string());
        }

        Ok(Self {
            counter,
            last_updated,
        })
    }

    fn render(&self) -> String {
        format!(
            "{}\n{}",
            self.counter,
            self.last_updated.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// カウンターファイルを扱うストア。
pub struct CounterStore {
    path: PathBuf,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// カウンターを読み込む。
    ///
    /// ファイルが存在しない場合は `{0, now}` を書き出してから返す。
    pub fn load(&self, now: DateTime<FixedOffset>) -> Result<CounterRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let record = CounterRecord::initial(now);
                self.save(&record)?;
                info!(path = ?self.path, "Created counter file");
                return Ok(record);
            }
            Err(source) => return Err(self.unavailable(source)),
        };

        CounterRecord::parse(&content).map_err(|reason| StateError::MalformedState {
            path: self.path.clone(),
            reason,
        })
    }

    /// カウンターを書き出す。
    ///
    /// 同じディレクトリの一時ファイルに書いてから rename するので、
    /// 途中で落ちても既存のファイルが切り詰められることはない。
    pub fn save(&self, record: &CounterRecord) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.unavailable(e))?;
        temp.write_all(record.render().as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| self.unavailable(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.unavailable(e.error))?;

        Ok(())
    }

    fn unavailable(&self, source: io::Error) -> StateError {
        StateError::StorageUnavailable {
            path: self.path.clone(),
            source,
        }
    }
}
