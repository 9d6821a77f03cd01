//! Per-core ready queues.
//!
//! Every core owns one queue. The ordering policy is chosen once, when the core is
//! built (see `scheduler_creator`), so dispatch goes through the `LocalScheduler`
//! enum rather than a trait object.
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use crate::task::Task;

pub trait SchedulerBase {
    /// Inserts a task. Never blocks and never rejects.
    fn add_task(&mut self, task: Task);
    /// Removes the highest-priority task, or returns `None` when the queue is empty.
    fn get_next_task(&mut self) -> Option<Task>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tasks leave in insertion order.
#[derive(Debug, Default)]
pub struct FifoScheduler {
    ready_queue: VecDeque<Task>,
}

impl SchedulerBase for FifoScheduler {
    fn add_task(&mut self, task: Task) {
        self.ready_queue.push_back(task);
    }

    fn get_next_task(&mut self) -> Option<Task> {
        self.ready_queue.pop_front()
    }

    fn len(&self) -> usize {
        self.ready_queue.len()
    }
}

#[derive(Debug)]
struct QueuedTask {
    sequence: u64,
    task: Task,
}

impl QueuedTask {
    fn key(&self) -> (u32, u64) {
        (self.task.burst_time(), self.sequence)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Min-heap on burst time. Equal burst times leave in insertion order.
#[derive(Debug, Default)]
pub struct ShortestBurstFirstScheduler {
    ready_queue: BinaryHeap<Reverse<QueuedTask>>,
    next_sequence: u64,
}

impl SchedulerBase for ShortestBurstFirstScheduler {
    fn add_task(&mut self, task: Task) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ready_queue.push(Reverse(QueuedTask { sequence, task }));
    }

    fn get_next_task(&mut self) -> Option<Task> {
        self.ready_queue.pop().map(|Reverse(queued)| queued.task)
    }

    fn len(&self) -> usize {
        self.ready_queue.len()
    }
}

#[derive(Debug)]
pub enum LocalScheduler {
    Fifo(FifoScheduler),
    ShortestBurstFirst(ShortestBurstFirstScheduler),
}

impl SchedulerBase for LocalScheduler {
    fn add_task(&mut self, task: Task) {
        match self {
            LocalScheduler::Fifo(scheduler) => scheduler.add_task(task),
            LocalScheduler::ShortestBurstFirst(scheduler) => scheduler.add_task(task),
        }
    }

    fn get_next_task(&mut self) -> Option<Task> {
        match self {
            LocalScheduler::Fifo(scheduler) => scheduler.get_next_task(),
            LocalScheduler::ShortestBurstFirst(scheduler) => scheduler.get_next_task(),
        }
    }

    fn len(&self) -> usize {
        match self {
            LocalScheduler::Fifo(scheduler) => scheduler.len(),
            LocalScheduler::ShortestBurstFirst(scheduler) => scheduler.len(),
        }
    }
}
