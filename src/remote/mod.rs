// src/remote/mod.rs
pub mod rows;
pub mod supabase;
pub mod traits;

use tokio::task::JoinHandle;

/// Owner of a spawned subscription task. Aborting on drop ties the stream's
/// lifetime to whoever holds the handle, so teardown cannot leak a reader
/// that keeps writing after its consumer is gone.
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
