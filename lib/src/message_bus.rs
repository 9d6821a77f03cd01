//! In-process transport between cores.
//!
//! Each core has a FIFO inbox and a table of pending synchronous requests. Async
//! sends go straight to the receiver's inbox. A synchronous request registers a
//! one-shot reply slot keyed by its correlation id, enqueues the request, and
//! blocks until the matching reply is put into that slot, the wait times out, or
//! the caller cancels it.
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::{
    error::BusError,
    message::{CorrelationId, Message},
    task::Task,
    util::get_ring_successor,
};

type PendingReplies = Mutex<HashMap<CorrelationId, Sender<Message>>>;

struct Mailbox {
    inbox_sender: Sender<Message>,
    inbox_receiver: Receiver<Message>,
    pending_replies: PendingReplies,
    sent_count: AtomicU64,
    recv_count: AtomicU64,
}

impl Mailbox {
    fn new() -> Self {
        let (inbox_sender, inbox_receiver) = crossbeam_channel::unbounded();
        Self {
            inbox_sender,
            inbox_receiver,
            pending_replies: Mutex::new(HashMap::new()),
            sent_count: AtomicU64::new(0),
            recv_count: AtomicU64::new(0),
        }
    }
}

/// Where `send_sync_reply` put the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDelivery {
    /// Handed to the blocked requester, which will act on it.
    Waiter,
    /// No live waiter; the reply was queued in the receiver's inbox instead.
    Inbox,
}

/// How long a synchronous request waits, and how often it checks for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub wait_slice: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(200),
            wait_slice: Duration::from_millis(5),
        }
    }
}

/// Reply slot registered for the lifetime of one synchronous request.
/// Dropping it removes the registration on every exit path.
struct PendingReply<'a> {
    pending_replies: &'a PendingReplies,
    correlation_id: CorrelationId,
    receiver: Receiver<Message>,
    registered: bool,
}

impl<'a> PendingReply<'a> {
    fn register(pending_replies: &'a PendingReplies, correlation_id: CorrelationId) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        pending_replies.lock().insert(correlation_id, sender);
        Self {
            pending_replies,
            correlation_id,
            receiver,
            registered: true,
        }
    }

    /// Removes the slot, then hands back a reply that was delivered before the removal.
    /// No reply can reach the slot once this returns.
    fn deregister(&mut self) -> Option<Message> {
        if self.registered {
            self.pending_replies.lock().remove(&self.correlation_id);
            self.registered = false;
        }
        self.receiver.try_recv().ok()
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.registered {
            self.pending_replies.lock().remove(&self.correlation_id);
        }
    }
}

pub struct MessageBus {
    mailboxes: Vec<Mailbox>,
}

impl MessageBus {
    pub fn new(num_cores: usize) -> Self {
        Self {
            mailboxes: (0..num_cores).map(|_| Mailbox::new()).collect(),
        }
    }

    pub fn get_number_of_cores(&self) -> usize {
        self.mailboxes.len()
    }

    fn mailbox(&self, core_id: usize) -> Result<&Mailbox, BusError> {
        self.mailboxes
            .get(core_id)
            .ok_or(BusError::UnknownCore(core_id))
    }

    fn count_delivery(&self, from_core: usize, to_core: usize) {
        if let Some(sender) = self.mailboxes.get(from_core) {
            sender.sent_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(receiver) = self.mailboxes.get(to_core) {
            receiver.recv_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fire-and-forget delivery into `to_core`'s inbox.
    pub fn send_async(
        &self,
        from_core: usize,
        to_core: usize,
        message: Message,
    ) -> Result<(), BusError> {
        let mailbox = self.mailbox(to_core).map_err(|err| {
            warn!("Dropping {}: {}", message, err);
            err
        })?;
        // The receiver half lives in the same mailbox, so the channel never disconnects.
        if mailbox.inbox_sender.send(message).is_ok() {
            self.count_delivery(from_core, to_core);
        }
        Ok(())
    }

    /// Next message for `core_id`, or `None` if its inbox is empty. Never blocks.
    pub fn poll_message(&self, core_id: usize) -> Option<Message> {
        self.mailboxes
            .get(core_id)
            .and_then(|mailbox| mailbox.inbox_receiver.try_recv().ok())
    }

    /// Sends `request` to `to_core` and blocks until the reply carrying the same
    /// correlation id arrives.
    ///
    /// The wait ends early with `BusError::Timeout` after `wait.timeout`, or with
    /// `BusError::Cancelled` once `is_cancelled` returns true (checked every
    /// `wait.wait_slice`). In every case the reply slot is deregistered before
    /// returning, and a reply that raced with the deregistration is still returned.
    pub fn send_sync_request(
        &self,
        from_core: usize,
        to_core: usize,
        request: Message,
        wait: WaitPolicy,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<Message, BusError> {
        let correlation_id = request.correlation_id();
        let requester = self.mailbox(from_core)?;
        let mut slot = PendingReply::register(&requester.pending_replies, correlation_id);

        self.send_async(from_core, to_core, request)?;

        let started = Instant::now();
        loop {
            let remaining = wait.timeout.saturating_sub(started.elapsed());
            match slot.receiver.recv_timeout(wait.wait_slice.min(remaining)) {
                Ok(reply) => {
                    if let Some(duplicate) = slot.deregister() {
                        warn!("Discarding duplicate reply {}", duplicate);
                    }
                    return Ok(reply);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let cancelled = is_cancelled();
                    if !cancelled && started.elapsed() < wait.timeout {
                        continue;
                    }
                    if let Some(reply) = slot.deregister() {
                        return Ok(reply);
                    }
                    return Err(if cancelled {
                        BusError::Cancelled { correlation_id }
                    } else {
                        BusError::Timeout { correlation_id }
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    slot.deregister();
                    return Err(BusError::Cancelled { correlation_id });
                }
            }
        }
    }

    /// Delivers `reply` to the waiter registered under its correlation id on
    /// `to_core`, or queues it in `to_core`'s inbox when no such waiter exists.
    pub fn send_sync_reply(
        &self,
        from_core: usize,
        to_core: usize,
        reply: Message,
    ) -> Result<ReplyDelivery, BusError> {
        let mailbox = self.mailbox(to_core)?;
        // The table lock is held across the hand-off so the waiter cannot deregister mid-delivery.
        let reply = match mailbox.pending_replies.lock().get(&reply.correlation_id()) {
            Some(waiter) => match waiter.try_send(reply) {
                Ok(()) => {
                    self.count_delivery(from_core, to_core);
                    return Ok(ReplyDelivery::Waiter);
                }
                Err(TrySendError::Full(reply) | TrySendError::Disconnected(reply)) => reply,
            },
            None => reply,
        };
        debug!("No live waiter for {}, falling back to inbox", reply);
        self.send_async(from_core, to_core, reply)?;
        Ok(ReplyDelivery::Inbox)
    }

    /// Best-effort offload of `task` to the next core in the ring.
    pub fn request_offload(&self, from_core: usize, task: Task) -> Result<(), BusError> {
        let to_core = get_ring_successor(from_core, self.get_number_of_cores());
        let offload = Message::offload_request(task, from_core, to_core);
        self.send_async(from_core, to_core, offload)
    }

    /// Number of synchronous requests `core_id` is currently blocked on.
    pub fn get_pending_reply_count(&self, core_id: usize) -> usize {
        self.mailboxes
            .get(core_id)
            .map_or(0, |mailbox| mailbox.pending_replies.lock().len())
    }

    pub fn get_sent_count_snapshot(&self) -> BTreeMap<usize, u64> {
        self.mailboxes
            .iter()
            .enumerate()
            .map(|(core_id, mailbox)| (core_id, mailbox.sent_count.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn get_recv_count_snapshot(&self) -> BTreeMap<usize, u64> {
        self.mailboxes
            .iter()
            .enumerate()
            .map(|(core_id, mailbox)| (core_id, mailbox.recv_count.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn create_task(id: usize) -> Task {
        Task::new(id, 10, 10, 0)
    }

    fn short_wait(timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(timeout_ms),
            wait_slice: Duration::from_millis(2),
        }
    }

    /// Answers every request that reaches `core_id` with `kind`, until `stop` is set.
    fn spawn_responder(
        bus: Arc<MessageBus>,
        core_id: usize,
        kind: MessageKind,
        stop: Arc<AtomicBool>,
    ) -> thread::JoinHandle<Vec<ReplyDelivery>> {
        thread::spawn(move || {
            let mut deliveries = Vec::new();
            while !stop.load(Ordering::SeqCst) {
                match bus.poll_message(core_id) {
                    Some(request) => {
                        let reply = request.reply(kind.clone(), core_id);
                        deliveries.push(
                            bus.send_sync_reply(core_id, request.from_core(), reply)
                                .unwrap(),
                        );
                    }
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            deliveries
        })
    }

    #[test]
    fn test_message_bus_send_async_normal() {
        let bus = MessageBus::new(2);
        bus.send_async(0, 1, Message::offload_request(create_task(0), 0, 1))
            .unwrap();
        bus.send_async(0, 1, Message::offload_request(create_task(1), 0, 1))
            .unwrap();

        assert_eq!(bus.poll_message(1).unwrap().into_task().unwrap().id(), 0);
        assert_eq!(bus.poll_message(1).unwrap().into_task().unwrap().id(), 1);
        assert!(bus.poll_message(1).is_none());
        assert!(bus.poll_message(0).is_none());

        assert_eq!(bus.get_sent_count_snapshot()[&0], 2);
        assert_eq!(bus.get_recv_count_snapshot()[&1], 2);
        assert_eq!(bus.get_recv_count_snapshot()[&0], 0);
    }

    #[test]
    fn test_message_bus_send_async_unknown_core() {
        let bus = MessageBus::new(2);
        let result = bus.send_async(0, 5, Message::offload_request(create_task(0), 0, 5));
        assert_eq!(result, Err(BusError::UnknownCore(5)));
        assert_eq!(bus.get_sent_count_snapshot()[&0], 0);
        assert!(bus.poll_message(5).is_none());
    }

    #[test]
    fn test_message_bus_request_offload_targets_ring_successor() {
        let bus = MessageBus::new(3);
        bus.request_offload(2, create_task(9)).unwrap();
        let message = bus.poll_message(0).unwrap();
        assert_eq!(message.kind(), &MessageKind::OffloadRequest);
        assert_eq!(message.from_core(), 2);
        assert_eq!(message.to_core(), 0);
    }

    #[test]
    fn test_message_bus_sync_request_receives_matching_reply() {
        let bus = Arc::new(MessageBus::new(2));
        let stop = Arc::new(AtomicBool::new(false));
        let responder = spawn_responder(
            Arc::clone(&bus),
            1,
            MessageKind::ResourceGranted,
            Arc::clone(&stop),
        );

        let request = Message::resource_request(create_task(3), 0, 1);
        let correlation_id = request.correlation_id();
        let reply = bus
            .send_sync_request(0, 1, request, short_wait(2_000), || false)
            .unwrap();

        stop.store(true, Ordering::SeqCst);
        let deliveries = responder.join().unwrap();

        assert_eq!(reply.correlation_id(), correlation_id);
        assert_eq!(reply.kind(), &MessageKind::ResourceGranted);
        assert_eq!(deliveries, vec![ReplyDelivery::Waiter]);
        assert_eq!(bus.get_pending_reply_count(0), 0);
        assert_eq!(bus.get_sent_count_snapshot()[&0], 1);
        assert_eq!(bus.get_sent_count_snapshot()[&1], 1);
        assert_eq!(bus.get_recv_count_snapshot()[&0], 1);
        assert_eq!(bus.get_recv_count_snapshot()[&1], 1);
    }

    #[test]
    fn test_message_bus_concurrent_requests_from_one_core_are_matched() {
        let bus = Arc::new(MessageBus::new(2));
        let stop = Arc::new(AtomicBool::new(false));
        let responder = spawn_responder(
            Arc::clone(&bus),
            1,
            MessageKind::ResourceDenied,
            Arc::clone(&stop),
        );

        let waiters: Vec<_> = (0..8)
            .map(|id| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    let request = Message::resource_request(create_task(id), 0, 1);
                    let correlation_id = request.correlation_id();
                    let reply = bus
                        .send_sync_request(0, 1, request, short_wait(5_000), || false)
                        .unwrap();
                    assert_eq!(reply.correlation_id(), correlation_id);
                    assert_eq!(reply.into_task().unwrap().id(), id);
                })
            })
            .collect();
        for waiter in waiters {
            waiter.join().unwrap();
        }

        stop.store(true, Ordering::SeqCst);
        let deliveries = responder.join().unwrap();
        assert_eq!(deliveries.len(), 8);
        assert!(deliveries
            .iter()
            .all(|delivery| *delivery == ReplyDelivery::Waiter));
        assert_eq!(bus.get_pending_reply_count(0), 0);
    }

    #[test]
    fn test_message_bus_sync_request_times_out_and_deregisters() {
        let bus = MessageBus::new(2);
        let request = Message::resource_request(create_task(0), 0, 1);
        let correlation_id = request.correlation_id();

        let result = bus.send_sync_request(0, 1, request, short_wait(20), || false);

        assert_eq!(result, Err(BusError::Timeout { correlation_id }));
        assert_eq!(bus.get_pending_reply_count(0), 0);
        // The request itself was delivered and is still waiting in the peer's inbox.
        assert!(bus.poll_message(1).is_some());
    }

    #[test]
    fn test_message_bus_sync_request_cancelled_and_deregisters() {
        let bus = MessageBus::new(2);
        let request = Message::resource_request(create_task(0), 0, 1);
        let correlation_id = request.correlation_id();

        let result = bus.send_sync_request(0, 1, request, short_wait(60_000), || true);

        assert_eq!(result, Err(BusError::Cancelled { correlation_id }));
        assert_eq!(bus.get_pending_reply_count(0), 0);
    }

    #[test]
    fn test_message_bus_sync_request_unknown_core_deregisters() {
        let bus = MessageBus::new(2);
        let request = Message::resource_request(create_task(0), 0, 7);
        let result = bus.send_sync_request(0, 7, request, short_wait(1_000), || false);
        assert_eq!(result, Err(BusError::UnknownCore(7)));
        assert_eq!(bus.get_pending_reply_count(0), 0);
    }

    #[test]
    fn test_message_bus_late_reply_falls_back_to_inbox() {
        let bus = MessageBus::new(2);
        let request = Message::resource_request(create_task(0), 0, 1);
        assert!(bus
            .send_sync_request(0, 1, request, short_wait(10), || false)
            .is_err());

        let stale_request = bus.poll_message(1).unwrap();
        let reply = stale_request.reply(MessageKind::ResourceGranted, 1);
        assert_eq!(
            bus.send_sync_reply(1, 0, reply).unwrap(),
            ReplyDelivery::Inbox
        );

        let queued = bus.poll_message(0).unwrap();
        assert_eq!(queued.kind(), &MessageKind::ResourceGranted);
        assert_eq!(queued.correlation_id(), stale_request.correlation_id());
    }

    #[test]
    fn test_message_bus_duplicate_reply_unblocks_only_once() {
        let bus = Arc::new(MessageBus::new(2));
        let waiter = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let request = Message::resource_request(create_task(0), 0, 1);
                bus.send_sync_request(0, 1, request, short_wait(5_000), || false)
            })
        };

        let request = loop {
            if let Some(request) = bus.poll_message(1) {
                break request;
            }
            thread::sleep(Duration::from_millis(1));
        };
        let first = bus
            .send_sync_reply(1, 0, request.reply(MessageKind::ResourceGranted, 1))
            .unwrap();
        let reply = waiter.join().unwrap().unwrap();
        let second = bus
            .send_sync_reply(1, 0, request.reply(MessageKind::ResourceGranted, 1))
            .unwrap();

        assert_eq!(first, ReplyDelivery::Waiter);
        assert_eq!(second, ReplyDelivery::Inbox);
        assert_eq!(reply.correlation_id(), request.correlation_id());
    }

    #[test]
    fn test_message_bus_counters_are_monotonic() {
        let bus = MessageBus::new(2);
        let mut previous = bus.get_sent_count_snapshot()[&0];
        for id in 0..5 {
            bus.request_offload(0, create_task(id)).unwrap();
            let current = bus.get_sent_count_snapshot()[&0];
            assert!(current > previous);
            previous = current;
        }
    }
}
