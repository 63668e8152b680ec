//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::Level::{self, Trace};
use log::{debug, log_enabled, trace};
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::{Event, EventId};
use crate::handler::EventHandler;
use crate::log::{get_colored, level_label, log_undelivered_event};
use crate::state::{SimulationState, Step};
use crate::tick::{ListenerId, Listeners, TickInfo};

/// Represents a simulation, provides methods for its configuration and execution.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
    tick_listeners: Listeners<dyn FnMut(&TickInfo)>,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
            tick_listeners: Listeners::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the identifier of component by its name.
    ///
    /// Panics if component with such name does not exist.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cloudsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// assert_eq!(sim.lookup_id(comp_ctx.name()), 0);
    /// ```
    pub fn lookup_id(&self, name: &str) -> Id {
        match self.name_to_id.get(name) {
            Some(&id) => id,
            None => panic!("Component {} is not registered", name),
        }
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such Id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    /// Creates a new simulation context with specified name.
    ///
    /// Component ids are assigned sequentially starting from 0.
    /// Creating a context for already registered name reuses its id.
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(
            self.register(name.as_ref()),
            name.as_ref(),
            self.sim_state.clone(),
            self.names.clone(),
        );
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Created context: {}",
            self.time(),
            level_label(Level::Debug),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the event handler implementation for component with specified name, returns the component Id.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Added handler: {}",
            self.time(),
            level_label(Level::Debug),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Removes the event handler for component with specified name.
    ///
    /// Pending events destined for this component are cancelled.
    /// Events emitted to it later are dropped until the handler is added again.
    pub fn remove_handler<S>(&mut self, name: S)
    where
        S: AsRef<str>,
    {
        let id = self.lookup_id(name.as_ref());
        self.handlers[id as usize] = None;
        self.sim_state.borrow_mut().cancel_events(|e| e.dst == id);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Removed handler: {}",
            self.time(),
            level_label(Level::Debug),
            json!({"name": name.as_ref(), "id": id})
        );
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Enables periodic clock ticks with given interval starting from the current time,
    /// or disables them if `None` is passed.
    ///
    /// Ticks are fired between events: before processing an event whose time is strictly greater
    /// than the next tick time, the clock is advanced to the tick time and all tick listeners are invoked.
    /// Ticks alone never keep the simulation running.
    pub fn set_clock_tick_interval(&mut self, interval: Option<f64>) {
        self.sim_state.borrow_mut().set_clock_tick_interval(interval);
    }

    /// Returns the clock tick interval if ticks are enabled.
    pub fn clock_tick_interval(&self) -> Option<f64> {
        self.sim_state.borrow().clock_tick_interval()
    }

    /// Subscribes the listener to clock ticks, returns the handle to unsubscribe it.
    ///
    /// Listeners are invoked in the order of subscription.
    /// Events emitted by a listener are visible to the very next step.
    pub fn add_clock_tick_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TickInfo) + 'static,
    {
        self.tick_listeners.add(Box::new(listener))
    }

    /// Unsubscribes the clock tick listener, returns `false` if it was not registered.
    pub fn remove_clock_tick_listener(&mut self, id: ListenerId) -> bool {
        self.tick_listeners.remove(id)
    }

    fn fire_tick(&mut self, tick: TickInfo) {
        trace!(
            target: "simulation",
            "[{:.3} {} simulation] Clock tick: {}",
            tick.time,
            get_colored("TICK", colored::Color::BrightBlack),
            json!(tick)
        );
        for listener in self.tick_listeners.iter_mut() {
            listener(&tick);
        }
    }

    fn dispatch(&mut self, event: Event) {
        let handler = match self.handlers.get(event.dst as usize) {
            Some(Some(handler)) => handler.clone(),
            _ => {
                log_undelivered_event(event);
                return;
            }
        };
        if log_enabled!(Trace) {
            let src_name = self.lookup_name(event.src);
            let dst_name = self.lookup_name(event.dst);
            trace!(
                target: &dst_name,
                "[{:.3} {} {}] {}",
                event.time,
                get_colored("EVENT", colored::Color::BrightBlack),
                dst_name,
                json!({"type": event.tag(), "data": event.data, "src": src_name})
            );
        }
        handler.borrow_mut().on(event);
    }

    /// Performs a single step through the simulation.
    ///
    /// The step is either a clock tick or processing of the next event.
    /// If there is no handler registered for the event destination, the event is discarded.
    ///
    /// Returns `true` if some step was made and `false` otherwise. The latter means that there are no pending events
    /// (or the termination time is reached), so no progress can be made.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use cloudsim_core::Simulation;
    ///
    /// #[derive(Serialize)]
    /// pub struct SomeEvent {
    /// }
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// comp_ctx.emit_self(SomeEvent {}, 1.2);
    /// assert!(sim.step());
    /// assert_eq!(sim.time(), 1.2);
    /// assert!(!sim.step());
    /// ```
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_step();
        match next {
            Some(Step::Tick(tick)) => {
                self.fire_tick(tick);
                true
            }
            Some(Step::Event(event)) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps through the simulation while the next step time does not exceed `max_time`.
    ///
    /// The clock is not advanced to `max_time` if there is nothing to process.
    /// Returns `true` if there are pending events left and `false` otherwise.
    pub fn run_until(&mut self, max_time: f64) -> bool {
        loop {
            let next_time = self.sim_state.borrow_mut().peek_time();
            match next_time {
                Some(time) if time <= max_time => {
                    self.step();
                }
                Some(_) => return true,
                None => return false,
            }
        }
    }

    /// Steps through the simulation for the specified duration starting from the current time.
    ///
    /// Returns `true` if there are pending events left and `false` otherwise.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.time() + duration;
        self.run_until(end_time)
    }

    /// Stops the simulation once the clock would go beyond the specified time.
    ///
    /// Events with time equal to the termination time are still processed.
    pub fn terminate_at(&mut self, time: f64) {
        self.sim_state.borrow_mut().terminate_at(time);
    }

    /// Returns the termination time if it was set.
    pub fn termination_time(&self) -> Option<f64> {
        self.sim_state.borrow().termination_time()
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution
    /// using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns the total number of created events.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Returns the number of pending (not yet processed and not cancelled) events.
    pub fn pending_event_count(&self) -> usize {
        self.sim_state.borrow().pending_event_count()
    }

    /// Cancels the specified event.
    pub fn cancel_event(&mut self, id: EventId) {
        self.sim_state.borrow_mut().cancel_event(id);
    }

    /// Cancels events that satisfy the given predicate function.
    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.sim_state.borrow_mut().cancel_events(pred);
    }
}
