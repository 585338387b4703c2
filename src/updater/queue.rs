use std::{
    collections::{BTreeMap, VecDeque},
    fs::{self, OpenOptions},
    future::poll_fn,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio_util::time::{delay_queue::Key, DelayQueue};

use super::change::Change;
use crate::error::DegraphmalizerError;

pub fn error_log_path(log_path: &Path, index: &str) -> PathBuf {
    log_path.join(format!("{index}-error.log"))
}

pub fn overflow_path(log_path: &Path, index: &str) -> PathBuf {
    log_path.join(format!("{index}-overflow.log"))
}

/// Appends changes to a log file, one `ACTION,TYPE,VERSION,ID` line each.
pub fn append_changes<'a>(
    path: &Path,
    changes: impl IntoIterator<Item = &'a Change>,
) -> Result<usize, DegraphmalizerError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut written = 0;
    for change in changes {
        writeln!(file, "{change}")?;
        written += 1;
    }
    file.flush()?;
    Ok(written)
}

/// Parses a change log. Unreadable lines are logged and skipped.
pub fn read_changes(path: &Path) -> Result<Vec<Change>, DegraphmalizerError> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.parse::<Change>() {
            Ok(change) => Some(change),
            Err(e) => {
                tracing::warn!("skipping line in {path:?}: {e}");
                None
            }
        })
        .collect())
}

/// Pending changes of one updater.
///
/// Fresh changes wait in FIFO order; retries wait in a delay queue until their backoff has
/// passed. Once `limit` changes are held in memory, further arrivals are appended to the
/// overflow file and read back, oldest first, when memory drains.
pub struct ChangeQueue {
    ready: VecDeque<Change>,
    delayed: DelayQueue<u64>,
    waiting: BTreeMap<u64, (Key, Change)>,
    next_seq: u64,
    limit: usize,
    overflow: PathBuf,
    overflowed: usize,
}

impl ChangeQueue {
    /// Opens the queue, picking up whatever a previous run left in the overflow file.
    pub fn open(overflow: PathBuf, limit: usize) -> Result<Self, DegraphmalizerError> {
        let overflowed = if overflow.exists() {
            fs::read_to_string(&overflow)?
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count()
        } else {
            0
        };
        if overflowed > 0 {
            tracing::info!("{overflowed} change(s) waiting in {overflow:?}");
        }
        Ok(ChangeQueue {
            ready: VecDeque::new(),
            delayed: DelayQueue::new(),
            waiting: BTreeMap::new(),
            next_seq: 0,
            limit: limit.max(1),
            overflow,
            overflowed,
        })
    }

    pub fn in_memory(&self) -> usize {
        self.ready.len() + self.waiting.len()
    }

    pub fn len(&self) -> usize {
        self.in_memory() + self.overflowed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues a fresh change for immediate delivery.
    pub fn push(&mut self, change: Change) -> Result<(), DegraphmalizerError> {
        if self.overflowed > 0 || self.in_memory() >= self.limit {
            append_changes(&self.overflow, [&change])?;
            self.overflowed += 1;
            tracing::warn!(
                "queue limit {} reached, {change} spilled to {:?}",
                self.limit,
                self.overflow
            );
            return Ok(());
        }
        self.ready.push_back(change);
        Ok(())
    }

    /// Queues a change to become eligible after `delay`. Retries never spill: they already
    /// held a slot.
    pub fn push_delayed(&mut self, change: Change, delay: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = self.delayed.insert(seq, delay);
        self.waiting.insert(seq, (key, change));
    }

    /// Next eligible change, waiting for a delayed one if nothing is ready. Resolves to
    /// `None` at once when memory holds nothing.
    pub async fn next(&mut self) -> Option<Change> {
        if let Some(change) = self.ready.pop_front() {
            return Some(change);
        }
        loop {
            let expired = poll_fn(|cx| self.delayed.poll_expired(cx)).await?;
            if let Some((_, change)) = self.waiting.remove(expired.get_ref()) {
                return Some(change);
            }
        }
    }

    /// Moves overflowed changes back into memory once it has drained.
    pub fn refill(&mut self) -> Result<usize, DegraphmalizerError> {
        if self.overflowed == 0 || self.in_memory() > 0 {
            return Ok(0);
        }
        let mut changes = read_changes(&self.overflow)?;
        let rest = changes.split_off(changes.len().min(self.limit));
        let loaded = changes.len();
        self.ready.extend(changes);

        fs::remove_file(&self.overflow)?;
        if !rest.is_empty() {
            append_changes(&self.overflow, rest.iter())?;
        }
        self.overflowed = rest.len();
        tracing::debug!("reloaded {loaded} change(s) from {:?}", self.overflow);
        Ok(loaded)
    }

    /// Drops everything, the overflow file included.
    pub fn clear(&mut self) -> Result<usize, DegraphmalizerError> {
        let dropped = self.len();
        self.ready.clear();
        self.delayed.clear();
        self.waiting.clear();
        if self.overflowed > 0 {
            fs::remove_file(&self.overflow)?;
            self.overflowed = 0;
        }
        Ok(dropped)
    }

    /// Writes every in-memory change to the end of the overflow file for the next run.
    pub fn persist(&mut self) -> Result<usize, DegraphmalizerError> {
        let waiting: Vec<Change> = std::mem::take(&mut self.waiting)
            .into_values()
            .map(|(_, change)| change)
            .collect();
        self.delayed.clear();
        let ready: Vec<Change> = self.ready.drain(..).collect();
        let written = append_changes(&self.overflow, ready.iter().chain(waiting.iter()))?;
        self.overflowed += written;
        Ok(written)
    }
}
