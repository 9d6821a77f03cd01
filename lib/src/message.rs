//! Envelopes exchanged between cores.
use getset::{CopyGetters, Getters};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::task::Task;

/// Opaque token pairing one synchronous request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Best-effort request for the receiver to take a task. Nobody waits for an answer.
    OffloadRequest,
    /// Blocking request for the receiver to take a task the sender cannot admit.
    ResourceRequest,
    ResourceGranted,
    ResourceDenied,
    /// Any label this version does not understand. Receivers ignore it.
    Custom(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::OffloadRequest => "OFFLOAD_REQUEST",
            MessageKind::ResourceRequest => "RESOURCE_REQUEST",
            MessageKind::ResourceGranted => "RESOURCE_GRANTED",
            MessageKind::ResourceDenied => "RESOURCE_DENIED",
            MessageKind::Custom(label) => label,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageKind::ResourceGranted | MessageKind::ResourceDenied
        )
    }
}

impl FromStr for MessageKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OFFLOAD_REQUEST" => MessageKind::OffloadRequest,
            "RESOURCE_REQUEST" => MessageKind::ResourceRequest,
            "RESOURCE_GRANTED" => MessageKind::ResourceGranted,
            "RESOURCE_DENIED" => MessageKind::ResourceDenied,
            other => MessageKind::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Message {
    #[getset(get = "pub")]
    kind: MessageKind,
    #[getset(get = "pub")]
    task: Option<Task>,
    #[getset(get_copy = "pub")]
    from_core: usize,
    #[getset(get_copy = "pub")]
    to_core: usize,
    #[getset(get_copy = "pub")]
    correlation_id: CorrelationId,
}

impl Message {
    /// Builds an envelope. A fresh correlation id is generated when none is given.
    pub fn new(
        kind: MessageKind,
        task: Option<Task>,
        from_core: usize,
        to_core: usize,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        Self {
            kind,
            task,
            from_core,
            to_core,
            correlation_id: correlation_id.unwrap_or_else(CorrelationId::generate),
        }
    }

    pub fn offload_request(task: Task, from_core: usize, to_core: usize) -> Self {
        Self::new(MessageKind::OffloadRequest, Some(task), from_core, to_core, None)
    }

    pub fn resource_request(task: Task, from_core: usize, to_core: usize) -> Self {
        Self::new(MessageKind::ResourceRequest, Some(task), from_core, to_core, None)
    }

    /// Reply addressed back to the sender of `self`, echoing its correlation id.
    pub fn reply(&self, kind: MessageKind, from_core: usize) -> Self {
        Self::new(
            kind,
            self.task.clone(),
            from_core,
            self.from_core,
            Some(self.correlation_id),
        )
    }

    pub fn into_task(self) -> Option<Task> {
        self.task
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = self
            .task
            .as_ref()
            .map_or_else(|| "none".to_string(), |task| task.id().to_string());
        write!(
            f,
            "[Message {} from core {} to core {} task={} cid={}]",
            self.kind, self.from_core, self.to_core, task, self.correlation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_task(id: usize) -> Task {
        Task::new(id, 10, 10, 0)
    }

    #[test]
    fn test_message_new_generates_correlation_id() {
        let first = Message::resource_request(create_task(0), 0, 1);
        let second = Message::resource_request(create_task(0), 0, 1);
        assert_ne!(first.correlation_id(), second.correlation_id());
    }

    #[test]
    fn test_message_new_keeps_given_correlation_id() {
        let correlation_id = CorrelationId::generate();
        let message = Message::new(
            MessageKind::ResourceDenied,
            None,
            1,
            0,
            Some(correlation_id),
        );
        assert_eq!(message.correlation_id(), correlation_id);
        assert_eq!(message.task(), &None);
    }

    #[test]
    fn test_message_reply_echoes_correlation_id() {
        let request = Message::resource_request(create_task(4), 2, 3);
        let reply = request.reply(MessageKind::ResourceGranted, 3);
        assert_eq!(reply.correlation_id(), request.correlation_id());
        assert_eq!(reply.from_core(), 3);
        assert_eq!(reply.to_core(), 2);
        assert_eq!(reply.kind(), &MessageKind::ResourceGranted);
        assert_eq!(reply.into_task().map(|task| task.id()), Some(4));
    }

    #[test]
    fn test_message_kind_from_str() {
        assert_eq!(
            "RESOURCE_REQUEST".parse::<MessageKind>().unwrap(),
            MessageKind::ResourceRequest
        );
        assert_eq!(
            "STATUS_PING".parse::<MessageKind>().unwrap(),
            MessageKind::Custom("STATUS_PING".to_string())
        );
        assert_eq!(MessageKind::OffloadRequest.to_string(), "OFFLOAD_REQUEST");
    }

    #[test]
    fn test_message_kind_is_reply() {
        assert!(MessageKind::ResourceGranted.is_reply());
        assert!(MessageKind::ResourceDenied.is_reply());
        assert!(!MessageKind::ResourceRequest.is_reply());
        assert!(!MessageKind::OffloadRequest.is_reply());
    }
}
