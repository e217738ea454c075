// Background task tracking
//
// Components spawn follow-up work from event listeners. The handles are kept
// so the hosting view (and tests) can wait for that work to settle.

use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime. Returns false when there is none.
    pub fn spawn<Fut>(&self, task: Fut) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No async runtime available, dropping background task");
                return false;
            }
        };

        let join = handle.spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|handle| !handle.is_finished());
        handles.push(join);
        true
    }

    /// Wait for every task, including the ones spawned while waiting
    pub async fn wait(&self) {
        loop {
            let pending = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    log::warn!("Background task failed: {}", e);
                }
            }
        }
    }

    /// Number of tasks not yet finished
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().filter(|handle| !handle.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_includes_nested_tasks() {
        let tasks = Arc::new(BackgroundTasks::new());
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.spawn(async move {
            tokio::task::yield_now().await;
            let counter = inner_done.clone();
            inner_tasks.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            inner_done.fetch_add(1, Ordering::SeqCst);
        });

        tasks.wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.pending(), 0);
    }

    #[test]
    fn test_spawn_without_runtime() {
        let tasks = BackgroundTasks::new();
        assert!(!tasks.spawn(async {}));
    }
}
