//! This module contains the definition of the core: one independent execution unit
//! with its own ready queue and memory pool, driven by a dedicated thread.
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{
    memory_manager::{MemoryManager, MemoryReservation},
    memory_tracker::MemoryTracker,
    message::{Message, MessageKind},
    message_bus::{MessageBus, ReplyDelivery, WaitPolicy},
    metrics_collector::MetricsCollector,
    scheduler::{LocalScheduler, SchedulerBase},
    task::{Task, TaskId},
    util::{burst_duration, get_ring_successor, now_millis},
};

///enum to represent what one pass of the core loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No task was ready.
    Idle,
    Executed(TaskId),
    /// A peer granted the task; it now belongs to that peer.
    Migrated(TaskId),
    /// The task could not be admitted anywhere and went back to the local queue.
    Requeued(TaskId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTiming {
    pub time_unit: Duration,
    pub idle_delay: Duration,
    pub wait: WaitPolicy,
}

impl Default for CoreTiming {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_millis(1),
            idle_delay: Duration::from_millis(5),
            wait: WaitPolicy::default(),
        }
    }
}

/// Components every core shares with its siblings.
#[derive(Clone)]
pub struct SharedContext {
    pub message_bus: Arc<MessageBus>,
    pub metrics_collector: Arc<MetricsCollector>,
    pub memory_tracker: Arc<MemoryTracker>,
}

impl SharedContext {
    pub fn new(num_cores: usize) -> Self {
        Self {
            message_bus: Arc::new(MessageBus::new(num_cores)),
            metrics_collector: Arc::new(MetricsCollector::new()),
            memory_tracker: Arc::new(MemoryTracker::new()),
        }
    }
}

pub struct Core {
    core_id: usize,
    num_cores: usize,
    scheduler: Arc<Mutex<LocalScheduler>>,
    memory_manager: Arc<MemoryManager>,
    shared: SharedContext,
    timing: CoreTiming,
    running: Arc<AtomicBool>,
    busy_time: Duration,
}

impl Core {
    pub fn new(
        core_id: usize,
        num_cores: usize,
        scheduler: LocalScheduler,
        memory_capacity: usize,
        shared: SharedContext,
        timing: CoreTiming,
    ) -> Self {
        Self {
            core_id,
            num_cores,
            scheduler: Arc::new(Mutex::new(scheduler)),
            memory_manager: Arc::new(MemoryManager::new(memory_capacity)),
            shared,
            timing,
            running: Arc::new(AtomicBool::new(true)),
            busy_time: Duration::ZERO,
        }
    }

    pub fn get_core_id(&self) -> usize {
        self.core_id
    }

    pub fn add_task(&self, task: Task) {
        self.scheduler.lock().add_task(task);
    }

    pub fn get_pending_task_count(&self) -> usize {
        self.scheduler.lock().len()
    }

    pub fn get_memory_manager(&self) -> Arc<MemoryManager> {
        Arc::clone(&self.memory_manager)
    }

    pub(crate) fn get_scheduler(&self) -> Arc<Mutex<LocalScheduler>> {
        Arc::clone(&self.scheduler)
    }

    pub fn get_busy_time(&self) -> Duration {
        self.busy_time
    }

    /// Spawns the core thread. The loop runs until `CoreHandle::stop` is called.
    pub fn start(self) -> io::Result<CoreHandle> {
        let handle_parts = (
            self.core_id,
            Arc::clone(&self.running),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.memory_manager),
        );
        let join_handle = thread::Builder::new()
            .name(format!("core-{}", self.core_id))
            .spawn(move || self.run())?;
        let (core_id, running, scheduler, memory_manager) = handle_parts;
        Ok(CoreHandle {
            core_id,
            running,
            scheduler,
            memory_manager,
            join_handle,
        })
    }

    fn run(mut self) {
        info!("Core {} started", self.core_id);
        let core_start = Instant::now();

        while self.running.load(Ordering::Acquire) {
            match self.run_iteration() {
                IterationOutcome::Idle | IterationOutcome::Requeued(_) => {
                    thread::sleep(self.timing.idle_delay)
                }
                IterationOutcome::Executed(_) | IterationOutcome::Migrated(_) => {}
            }
        }

        let wall_time = core_start.elapsed();
        self.shared.metrics_collector.record_core_utilization(
            self.core_id,
            self.busy_time.as_millis() as u64,
            wall_time.as_millis() as u64,
        );
        info!(
            "Core {} stopped after {:?} (busy {:?})",
            self.core_id, wall_time, self.busy_time
        );
    }

    /// One pass of the loop: service one inbound message, then dispatch one task.
    pub fn run_iteration(&mut self) -> IterationOutcome {
        if let Some(message) = self.shared.message_bus.poll_message(self.core_id) {
            self.handle_incoming_message(message);
        }

        let Some(task) = self.scheduler.lock().get_next_task() else {
            return IterationOutcome::Idle;
        };

        let memory_manager = Arc::clone(&self.memory_manager);
        let reservation = memory_manager.reserve(task.memory_required());
        match reservation {
            Some(reservation) => self.execute(task, reservation),
            None => self.negotiate(task),
        }
    }

    fn execute(&mut self, task: Task, reservation: MemoryReservation<'_>) -> IterationOutcome {
        let tracker = &self.shared.memory_tracker;
        tracker.record(self.core_id, self.memory_manager.get_used_memory());

        let start_time = now_millis();
        let exec_start = Instant::now();
        thread::sleep(burst_duration(task.burst_time(), self.timing.time_unit));
        let exec_time = exec_start.elapsed();
        let end_time = now_millis();

        reservation.release();
        tracker.record(self.core_id, self.memory_manager.get_used_memory());

        self.shared
            .metrics_collector
            .record_task_completion(self.core_id, &task, start_time, end_time);
        self.busy_time += exec_time;
        debug!("Core {} finished {} in {:?}", self.core_id, task, exec_time);
        IterationOutcome::Executed(task.id())
    }

    /// Asks the ring successor to take a task that does not fit locally.
    fn negotiate(&mut self, task: Task) -> IterationOutcome {
        let task_id = task.id();
        let peer = get_ring_successor(self.core_id, self.num_cores);
        if peer == self.core_id {
            // Nobody else services this inbox, so a request to ourselves could only time out.
            debug!("Core {} cannot admit {} and has no peer", self.core_id, task);
            self.add_task(task);
            return IterationOutcome::Requeued(task_id);
        }

        let request = Message::resource_request(task.clone(), self.core_id, peer);
        let running = Arc::clone(&self.running);
        let reply = self.shared.message_bus.send_sync_request(
            self.core_id,
            peer,
            request,
            self.timing.wait,
            || !running.load(Ordering::Acquire),
        );

        match reply {
            Ok(reply) if *reply.kind() == MessageKind::ResourceGranted => {
                debug!("Core {} migrated {} to core {}", self.core_id, task, peer);
                IterationOutcome::Migrated(task_id)
            }
            Ok(reply) => {
                debug!(
                    "Core {} got {} for {}, requeueing",
                    self.core_id,
                    reply.kind(),
                    task
                );
                self.add_task(task);
                IterationOutcome::Requeued(task_id)
            }
            Err(err) => {
                debug!("Core {} negotiation failed: {}, requeueing", self.core_id, err);
                self.add_task(task);
                IterationOutcome::Requeued(task_id)
            }
        }
    }

    fn handle_incoming_message(&mut self, message: Message) {
        match message.kind() {
            MessageKind::OffloadRequest => self.accept_offload(message),
            MessageKind::ResourceRequest => self.answer_resource_request(message),
            MessageKind::ResourceGranted | MessageKind::ResourceDenied => {
                // The requester gave up waiting and already requeued the task.
                warn!("Core {} ignoring stale reply {}", self.core_id, message);
            }
            MessageKind::Custom(_) => {
                debug!("Core {} ignoring {}", self.core_id, message);
            }
        }
    }

    fn accept_offload(&mut self, message: Message) {
        let Some(task) = message.into_task() else {
            warn!("Core {} received an offload request without a task", self.core_id);
            return;
        };
        if self.memory_manager.can_fit(task.memory_required()) {
            debug!("Core {} accepted offloaded {}", self.core_id, task);
            self.add_task(task);
        } else {
            debug!("Core {} dropped offloaded {}", self.core_id, task);
        }
    }

    /// The requester is blocked until this reply reaches it, so a reply is always sent.
    fn answer_resource_request(&mut self, message: Message) {
        let requester = message.from_core();
        let can_take = match message.task() {
            Some(task) => self.memory_manager.can_fit(task.memory_required()),
            None => {
                warn!("Core {} received {} without a task", self.core_id, message);
                false
            }
        };
        let kind = if can_take {
            MessageKind::ResourceGranted
        } else {
            MessageKind::ResourceDenied
        };
        let reply = message.reply(kind, self.core_id);

        match self
            .shared
            .message_bus
            .send_sync_reply(self.core_id, requester, reply)
        {
            // The task is only ours once the grant has reached the waiting requester.
            Ok(ReplyDelivery::Waiter) if can_take => {
                if let Some(task) = message.into_task() {
                    debug!("Core {} took {} from core {}", self.core_id, task, requester);
                    self.add_task(task);
                }
            }
            Ok(ReplyDelivery::Inbox) if can_take => {
                debug!(
                    "Core {} granted a request core {} stopped waiting for",
                    self.core_id, requester
                );
            }
            Ok(_) => {}
            Err(err) => warn!("Core {} could not reply: {}", self.core_id, err),
        }
    }
}

/// Control handle for a started core.
pub struct CoreHandle {
    core_id: usize,
    running: Arc<AtomicBool>,
    scheduler: Arc<Mutex<LocalScheduler>>,
    memory_manager: Arc<MemoryManager>,
    join_handle: JoinHandle<()>,
}

impl CoreHandle {
    pub fn get_core_id(&self) -> usize {
        self.core_id
    }

    /// Asks the loop to exit at its next iteration boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.join_handle.is_finished()
    }

    pub fn add_task(&self, task: Task) {
        self.scheduler.lock().add_task(task);
    }

    pub fn get_pending_task_count(&self) -> usize {
        self.scheduler.lock().len()
    }

    pub fn get_memory_manager(&self) -> Arc<MemoryManager> {
        Arc::clone(&self.memory_manager)
    }

    /// Waits for the loop to exit. Call `stop` first.
    pub fn join(self) -> thread::Result<()> {
        self.join_handle.join()
    }
}
