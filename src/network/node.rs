use tokio::{sync::mpsc::Sender, task::JoinHandle};

use super::message::Envelope;
use crate::common::config::Workload;

/// Dispatcher-side handle to a running node processor.
pub struct Node {
    pub inbox: Sender<Envelope>,
    pub workload: Workload,
    pub task: JoinHandle<()>,
}

impl Node {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
