//! Hand-off queue to the single-threaded pulse handler.
//!
//! All pulse state-machine work happens on one dedicated thread owned by
//! block production; the network side only enqueues typed events. The queue
//! is unbounded: pulse rounds produce a small, protocol-limited number of
//! messages.

use blinknet_types::X25519PublicKey;
use blinknet_wire::PulseMessage;
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, trace};

/// A validated pulse message together with its authenticated sender.
#[derive(Clone, Debug)]
pub struct PulseEvent {
    /// Transport pubkey of the sending quorum member, when authenticated.
    pub from: Option<X25519PublicKey>,
    /// The typed message.
    pub message: PulseMessage,
}

/// Sending half of the pulse hand-off queue.
#[derive(Clone)]
pub struct PulseQueue {
    tx: Sender<PulseEvent>,
}

impl PulseQueue {
    /// Create the queue, returning the receiver for the handler thread.
    pub fn new() -> (Self, Receiver<PulseEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }

    /// Enqueue an event for the handler. Returns `false` if the handler has
    /// shut down.
    pub fn enqueue(&self, event: PulseEvent) -> bool {
        trace!(command = event.message.command(), "queueing pulse event");
        self.tx.send(event).is_ok()
    }
}

/// Spawn the dedicated pulse handler thread.
///
/// The handler owns the round state machine; it runs until the queue's last
/// sender is dropped.
pub fn spawn_pulse_handler<F>(rx: Receiver<PulseEvent>, mut handler: F) -> JoinHandle<()>
where
    F: FnMut(PulseEvent) + Send + 'static,
{
    std::thread::Builder::new()
        .name("pulse".to_string())
        .spawn(move || {
            debug!("pulse handler thread started");
            while let Ok(event) = rx.recv() {
                handler(event);
            }
            debug!("pulse handler thread stopped");
        })
        .expect("spawn pulse handler thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinknet_types::QuorumSignature;
    use std::sync::mpsc;

    fn event(position: usize) -> PulseEvent {
        PulseEvent {
            from: None,
            message: PulseMessage::Handshake {
                position,
                signature: QuorumSignature([position as u8; 64]),
            },
        }
    }

    #[test]
    fn test_events_delivered_in_order() {
        let (queue, rx) = PulseQueue::new();
        let (out_tx, out_rx) = mpsc::channel();
        let handle = spawn_pulse_handler(rx, move |event| {
            out_tx.send(event.message.position().unwrap()).unwrap();
        });

        for position in 0..5 {
            assert!(queue.enqueue(event(position)));
        }
        drop(queue);
        handle.join().unwrap();

        let received: Vec<usize> = out_rx.try_iter().collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_enqueue_after_shutdown() {
        let (queue, rx) = PulseQueue::new();
        drop(rx);
        assert!(!queue.enqueue(event(0)));
    }
}
