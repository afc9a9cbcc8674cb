//! Wire message exchanged between the coordinator and worker units.

use serde::{Deserialize, Serialize};

use crate::types::{ProcessId, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Release,
}

/// One message kind carries both directions; `granted` is only set on replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: ProcessId,
    pub resource: ResourceId,
    pub kind: MessageKind,
    pub granted: bool,
}

impl Message {
    #[inline]
    pub fn request(sender: ProcessId, resource: ResourceId) -> Self {
        Self {
            sender,
            resource,
            kind: MessageKind::Request,
            granted: false,
        }
    }

    #[inline]
    pub fn release(sender: ProcessId, resource: ResourceId) -> Self {
        Self {
            sender,
            resource,
            kind: MessageKind::Release,
            granted: false,
        }
    }

    /// Coordinator reply to the message's sender.
    #[inline]
    pub fn reply(self) -> Self {
        Self {
            granted: true,
            ..self
        }
    }

    #[inline]
    pub fn is_release(&self) -> bool {
        self.kind == MessageKind::Release
    }
}
