use std::collections::{BinaryHeap, HashSet};

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::log::log_incorrect_event;
use crate::tick::TickInfo;

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

/// The next thing the simulation loop has to process.
pub enum Step {
    Tick(TickInfo),
    Event(Event),
}

struct ClockTicks {
    interval: f64,
    origin: f64,
    count: u64,
}

impl ClockTicks {
    fn next_time(&self) -> f64 {
        self.origin + self.count as f64 * self.interval
    }
}

pub struct SimulationState {
    clock: f64,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    canceled_events: HashSet<EventId>,
    event_count: u64,
    ticks: Option<ClockTicks>,
    termination_time: Option<f64>,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            canceled_events: HashSet::new(),
            event_count: 0,
            ticks: None,
            termination_time: None,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rand)
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64, priority: i32) -> EventId
    where
        T: EventData,
    {
        let event_id = self.event_count;
        let event = Event {
            id: event_id,
            time: self.clock + delay.max(0.),
            priority,
            src,
            dst,
            data: Box::new(data),
        };
        if delay >= -EPSILON {
            self.events.push(event);
            self.event_count += 1;
            event_id
        } else {
            log_incorrect_event(event, &format!("negative delay {}", delay));
            panic!("Event delay is negative! It is not allowed to add events from the past.");
        }
    }

    fn drop_canceled_head(&mut self) {
        while let Some(event) = self.events.peek() {
            if self.canceled_events.remove(&event.id) {
                self.events.pop();
            } else {
                break;
            }
        }
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        self.drop_canceled_head();
        self.events.peek()
    }

    pub fn has_pending_events(&mut self) -> bool {
        self.peek_event().is_some()
    }

    /// Returns the time of the next step (clock tick or event) without performing it.
    pub fn peek_time(&mut self) -> Option<f64> {
        let event_time = self.peek_event()?.time;
        if let Some(limit) = self.termination_time {
            if event_time > limit {
                return None;
            }
        }
        match &self.ticks {
            Some(ticks) if event_time > ticks.next_time() => Some(ticks.next_time()),
            _ => Some(event_time),
        }
    }

    /// Pops the next step and advances the clock to its time.
    ///
    /// A clock tick is returned instead of the next event if the event lies strictly after the tick boundary.
    pub fn next_step(&mut self) -> Option<Step> {
        let event_time = self.peek_event()?.time;
        if let Some(limit) = self.termination_time {
            if event_time > limit {
                return None;
            }
        }
        if let Some(ticks) = self.ticks.as_mut() {
            let tick_time = ticks.next_time();
            if event_time > tick_time {
                let tick = TickInfo {
                    index: ticks.count,
                    time: tick_time,
                };
                ticks.count += 1;
                self.clock = self.clock.max(tick_time);
                return Some(Step::Tick(tick));
            }
        }
        let event = self.events.pop()?;
        self.clock = event.time;
        Some(Step::Event(event))
    }

    pub fn cancel_event(&mut self, id: EventId) {
        self.canceled_events.insert(id);
    }

    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        for event in self.events.iter() {
            if pred(event) {
                self.canceled_events.insert(event.id);
            }
        }
    }

    pub fn pending_event_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| !self.canceled_events.contains(&e.id))
            .count()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn set_clock_tick_interval(&mut self, interval: Option<f64>) {
        self.ticks = match interval {
            Some(interval) => {
                assert!(interval > 0., "Clock tick interval must be positive, got {}", interval);
                Some(ClockTicks {
                    interval,
                    origin: self.clock,
                    count: 0,
                })
            }
            None => None,
        };
    }

    pub fn clock_tick_interval(&self) -> Option<f64> {
        self.ticks.as_ref().map(|t| t.interval)
    }

    pub fn terminate_at(&mut self, time: f64) {
        let time = time.max(self.clock);
        self.termination_time = Some(self.termination_time.map_or(time, |t| t.min(time)));
    }

    pub fn termination_time(&self) -> Option<f64> {
        self.termination_time
    }
}
