//! Tee a single-use stream into independently consumable branches.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use parking_lot::Mutex;

use super::{FileStream, SiteFile};

struct TeeState {
  source: FileStream,
  /// Pending items per branch; `None` once that branch has been dropped.
  buffers: Vec<Option<VecDeque<Result<SiteFile>>>>,
}

struct Branch {
  index: usize,
  state: Arc<Mutex<TeeState>>,
}

/// Split `stream` into `count` branches that each observe every item in order.
///
/// All branches must be created before the source is pulled, which is why this takes the
/// stream by value and hands back every branch at once. Branches may be consumed on
/// different threads and at different speeds; items not yet seen by a slower branch are
/// buffered for it. Dropping a branch stops buffering for it.
pub fn fork_stream(stream: FileStream, count: usize) -> Vec<FileStream> {
  branches(stream, count)
    .into_iter()
    .map(|branch| Box::new(branch) as FileStream)
    .collect()
}

fn branches(stream: FileStream, count: usize) -> Vec<Branch> {
  let state = Arc::new(Mutex::new(TeeState {
    source: stream,
    buffers: (0..count).map(|_| Some(VecDeque::new())).collect(),
  }));

  (0..count)
    .map(|index| Branch {
      index,
      state: Arc::clone(&state),
    })
    .collect()
}

impl Iterator for Branch {
  type Item = Result<SiteFile>;

  fn next(&mut self) -> Option<Self::Item> {
    let mut state = self.state.lock();
    if let Some(item) = state.buffers[self.index]
      .as_mut()
      .and_then(VecDeque::pop_front)
    {
      return Some(item);
    }

    let item = state.source.next()?;
    for (index, buffer) in state.buffers.iter_mut().enumerate() {
      if index == self.index {
        continue;
      }
      let Some(buffer) = buffer else {
        continue;
      };
      // Errors are not cloneable; siblings get a rendered copy of the chain.
      let copy = match &item {
        Ok(file) => Ok(file.clone()),
        Err(err) => Err(anyhow!("{err:#}")),
      };
      buffer.push_back(copy);
    }
    Some(item)
  }
}

impl Drop for Branch {
  fn drop(&mut self) {
    self.state.lock().buffers[self.index] = None;
  }
}
