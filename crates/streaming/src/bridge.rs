use std::cell::RefCell;
use std::rc::Rc;

use crate::protocol::{HostMessage, SurfaceMessage};

/// Transport between a host session and one rendering surface.
///
/// Implementations only move envelopes; ordering within each direction must
/// be preserved.
pub trait Bridge {
    fn send(&mut self, message: HostMessage);

    /// Everything the surface produced since the previous call.
    fn receive(&mut self) -> Vec<SurfaceMessage>;
}

/// A shared handle is a bridge too, so the host and whoever drives the
/// surface can both hold it.
impl<T: Bridge> Bridge for Rc<RefCell<T>> {
    fn send(&mut self, message: HostMessage) {
        self.borrow_mut().send(message);
    }

    fn receive(&mut self) -> Vec<SurfaceMessage> {
        self.borrow_mut().receive()
    }
}

/// Bridge that keeps what it is sent and answers with scripted replies.
#[derive(Debug, Default)]
pub struct MemoryBridge {
    pub sent: Vec<HostMessage>,
    pub replies: Vec<SurfaceMessage>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, message: SurfaceMessage) {
        self.replies.push(message);
    }
}

impl Bridge for MemoryBridge {
    fn send(&mut self, message: HostMessage) {
        self.sent.push(message);
    }

    fn receive(&mut self) -> Vec<SurfaceMessage> {
        std::mem::take(&mut self.replies)
    }
}

#[cfg(test)]
mod tests {
    use super::{Bridge, MemoryBridge};
    use crate::protocol::{HostMessage, SurfaceMessage};
    use foundation::SequenceId;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn shared_handle_forwards_both_directions() {
        let inner = Rc::new(RefCell::new(MemoryBridge::new()));
        let mut handle = inner.clone();

        handle.send(HostMessage::calls(&[]));
        inner.borrow_mut().reply(SurfaceMessage::Ready);

        assert_eq!(inner.borrow().sent, vec![HostMessage::calls(&[])]);
        assert_eq!(handle.receive(), vec![SurfaceMessage::Ready]);
        assert!(handle.receive().is_empty());
    }

    #[test]
    fn memory_bridge_hands_out_replies_once() {
        let mut bridge = MemoryBridge::new();
        bridge.reply(SurfaceMessage::Delivered {
            through: SequenceId(3),
        });
        assert_eq!(bridge.receive().len(), 1);
        assert!(bridge.receive().is_empty());
    }
}
