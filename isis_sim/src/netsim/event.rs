// IsisSim: Link-State Routing on a Simulated Network
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module for defining events and the timed event queue

use crate::netsim::{DeviceId, IfIndex, LspId, MacAddr, RouterId, SimTime};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Layer 2 frame carrying one protocol packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination MAC address
    pub dst: MacAddr,
    /// Source MAC address
    pub src: MacAddr,
    /// Encoded packet
    pub payload: Vec<u8>,
}

/// Timers of a protocol instance. A timer is identified by its handle; the owner keeps the handle
/// of the live timer, and a fired timer whose handle does not match is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Periodic Hello transmission on an interface
    Hello(IfIndex),
    /// Adjacency hold time expired
    AdjacencyExpiry(IfIndex, RouterId),
    /// A down adjacency is removed
    AdjacencyDelete(IfIndex, RouterId),
    /// Remaining lifetime of an LSP in the database ran out
    LspAging(LspId),
    /// Periodic refresh of all self-originated fragments
    LspRefresh,
    /// Administrative overload times out
    OverloadTimeout,
}

/// One-shot jobs of a protocol instance. Scheduling a job that is already pending is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Regenerate all fragments marked dirty
    RegenerateDirty,
    /// Regenerate every self-originated fragment
    RegenerateAll,
    /// Run the SPF computation and install routes
    Spf,
    /// Transmit the flood queue of an interface
    Flood(IfIndex),
}

/// Handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// Event to handle
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A frame arrives at interface `ifindex` of device `to`.
    Deliver {
        /// Receiving device
        to: DeviceId,
        /// Receiving interface
        ifindex: IfIndex,
        /// The frame
        frame: Frame,
    },
    /// A timer of a device fires
    Timer {
        /// Device owning the timer
        device: DeviceId,
        /// Handle returned when the timer was scheduled
        handle: TimerHandle,
        /// Which timer
        timer: Timer,
    },
    /// A job of a device runs
    Job {
        /// Device owning the job
        device: DeviceId,
        /// Which job
        job: Job,
    },
}

impl Event {
    /// Returns the device that handles this event
    pub fn device(&self) -> DeviceId {
        match self {
            Event::Deliver { to, .. } => *to,
            Event::Timer { device, .. } => *device,
            Event::Job { device, .. } => *device,
        }
    }
}

/// A frame sent by a device, waiting to be put on the link by the network.
#[derive(Debug, Clone)]
pub(crate) struct Transmission {
    pub(crate) from: DeviceId,
    pub(crate) ifindex: IfIndex,
    pub(crate) frame: Frame,
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
struct ScheduledEvent {
    time: SimTime,
    seq: u64,
    event: Event,
}

// BinaryHeap is a max-heap, so the ordering is reversed: earliest time first, then lowest
// sequence number.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Event queue for enqueuing events. Events are ordered by their time, and events at the same
/// time are processed in the order in which they were scheduled.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    now: SimTime,
    next_seq: u64,
    outbox: Vec<Transmission>,
}

impl EventQueue {
    /// Create an empty queue at time 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time in milliseconds
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if no event is pending
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Time of the next pending event
    pub fn next_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    /// Schedule an event `delay` milliseconds from now. Returns the sequence number of the event.
    pub(crate) fn schedule(&mut self, delay: SimTime, event: Event) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time: self.now + delay, seq, event });
        seq
    }

    /// Schedule a timer for a device. The returned handle must be stored by the owner of the
    /// timer in order to recognize it when it fires.
    pub(crate) fn schedule_timer(
        &mut self,
        device: DeviceId,
        delay: SimTime,
        timer: Timer,
    ) -> TimerHandle {
        let handle = TimerHandle(self.next_seq);
        self.schedule(delay, Event::Timer { device, handle, timer });
        handle
    }

    /// Schedule a job to run as soon as possible, after all events already scheduled for now.
    pub(crate) fn schedule_job(&mut self, device: DeviceId, job: Job) {
        self.schedule(0, Event::Job { device, job });
    }

    /// Hand a frame to the network for transmission on the link of `ifindex`.
    pub(crate) fn transmit(&mut self, from: DeviceId, ifindex: IfIndex, frame: Frame) {
        self.outbox.push(Transmission { from, ifindex, frame });
    }

    /// Take all frames sent since the last call.
    pub(crate) fn take_outbox(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.outbox)
    }

    /// Pop the next event if it is scheduled at or before `until`, advancing the clock to the time
    /// of that event.
    pub(crate) fn pop_until(&mut self, until: SimTime) -> Option<Event> {
        match self.heap.peek() {
            Some(e) if e.time <= until => {}
            _ => return None,
        }
        let e = self.heap.pop()?;
        self.now = e.time;
        Some(e.event)
    }

    /// Advance the clock without processing any event. The clock never goes backwards.
    pub(crate) fn advance_to(&mut self, time: SimTime) {
        self.now = self.now.max(time);
    }
}
