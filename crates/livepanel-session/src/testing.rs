//! Test doubles shared by the unit tests.

use livepanel_core::ServerMessage;
use livepanel_gateway::Broadcaster;
use parking_lot::Mutex;

/// Records every broadcast instead of sending it anywhere.
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<ServerMessage>>,
}

impl RecordingBroadcaster {
    pub fn take(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, msg: ServerMessage) {
        self.sent.lock().push(msg);
    }
}
