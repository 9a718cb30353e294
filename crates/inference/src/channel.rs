use preprocess::Frame;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct Slot {
    sequence: u64,
    frame: Option<Frame>,
    /// Set once the sender is dropped.
    closed: bool,
}

/// Latest-value frame channel between a capture producer and the detection worker.
///
/// A submitted frame replaces any frame the worker has not picked up yet, so
/// the producer never blocks and the worker always sees the newest frame. The
/// worker takes the frame out of the slot, so once delivered the channel holds
/// no reference to its pixels.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = watch::channel(Slot::default());
    let tx = Arc::new(tx);
    (
        FrameSender { tx: tx.clone() },
        FrameReceiver {
            tx,
            rx,
            last_sequence: 0,
        },
    )
}

pub struct FrameSender {
    tx: Arc<watch::Sender<Slot>>,
}

impl FrameSender {
    /// Publish `frame`, dropping any undelivered one. Returns its sequence number.
    pub fn submit(&self, frame: Frame) -> u64 {
        let mut sequence = 0;
        self.tx.send_modify(|slot| {
            slot.sequence += 1;
            slot.frame = Some(frame);
            sequence = slot.sequence;
        });
        sequence
    }

    /// Whether the worker side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.tx.send_modify(|slot| slot.closed = true);
    }
}

#[derive(Debug)]
pub struct ReceivedFrame {
    pub frame: Frame,
    pub sequence: u64,
    /// Frames replaced before the worker could take them.
    pub skipped: u64,
}

pub struct FrameReceiver {
    /// Shared with the sender so the receiver can empty the slot.
    tx: Arc<watch::Sender<Slot>>,
    rx: watch::Receiver<Slot>,
    last_sequence: u64,
}

impl FrameReceiver {
    /// Wait for the next frame and take it out of the channel.
    ///
    /// Returns `None` once the sender is dropped and nothing is pending.
    pub async fn next_frame(&mut self) -> Option<ReceivedFrame> {
        loop {
            // Mark the current version seen before looking at the slot, so a
            // submit racing with the check still wakes `changed` below.
            let closed = self.rx.borrow_and_update().closed;

            let mut taken = None;
            self.tx.send_if_modified(|slot| {
                taken = slot.frame.take().map(|frame| (frame, slot.sequence));
                false
            });

            if let Some((frame, sequence)) = taken {
                let skipped = sequence.saturating_sub(self.last_sequence + 1);
                self.last_sequence = sequence;
                return Some(ReceivedFrame {
                    frame,
                    sequence,
                    skipped,
                });
            }

            if closed {
                return None;
            }
            self.rx.changed().await.ok()?;
        }
    }
}
