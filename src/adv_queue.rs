//! Queue of formatted advertisements waiting for the radio.
use heapless::Deque;

use crate::advertise::AdvertisementDescriptor;
use crate::double_buffer::DoubleBuffer;
use crate::radio::RadioController;
use crate::Error;

/// Bounded FIFO feeding a double-buffered advertising set.
///
/// Descriptors wait in the queue until the radio is idle. Advancing moves the head into the
/// inactive half of the double buffer, flips the buffer and only then hands the live half to the
/// controller, so the set being transmitted is never written.
pub struct AdvertisementQueue<const N: usize> {
    pending: Deque<AdvertisementDescriptor, N>,
    frames: DoubleBuffer<Option<AdvertisementDescriptor>>,
    in_flight: bool,
}

impl<const N: usize> AdvertisementQueue<N> {
    pub const fn new() -> Self {
        Self {
            pending: Deque::new(),
            frames: DoubleBuffer::new(None, None),
            in_flight: false,
        }
    }

    /// Queue a descriptor. Fails with `ResourceExhausted` when full.
    pub fn push(&mut self, descriptor: AdvertisementDescriptor) -> Result<(), Error> {
        self.pending.push_back(descriptor).map_err(|_| Error::ResourceExhausted)
    }

    /// Put the next queued descriptor on air if the radio is idle.
    ///
    /// A descriptor the controller refuses is dropped and the next one is tried, at most once
    /// per queue slot.
    pub fn try_advance<C: RadioController>(&mut self, controller: &C) -> Option<&AdvertisementDescriptor> {
        if self.in_flight {
            return None;
        }
        for _ in 0..N {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            let mut staged = self.frames.stage();
            *staged = Some(next);
            let Some(live) = staged.publish() else {
                continue;
            };
            match controller
                .configure_adv_set(live)
                .and_then(|_| controller.start_adv())
            {
                Ok(()) => {
                    trace!("[adv] on air, {:?} {} bytes", live.framing, live.adv_payload.len());
                    self.in_flight = true;
                    break;
                }
                Err(_) => {
                    warn!("[adv] controller refused descriptor, skipping");
                }
            }
        }
        self.current()
    }

    /// Descriptor currently on air.
    pub fn current(&self) -> Option<&AdvertisementDescriptor> {
        if self.in_flight {
            self.frames.live().as_ref()
        } else {
            None
        }
    }

    /// Drop every queued descriptor, returning how many were dropped. The set on air is untouched.
    pub fn flush(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// The set on air has ended.
    pub fn on_terminated(&mut self) {
        self.in_flight = false;
    }

    pub fn is_transmitting(&self) -> bool {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
