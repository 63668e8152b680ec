use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use sugars::{rc, refcell};

use cloudsim_core::{cast, Event, EventHandler, Simulation, SimulationContext, TickInfo};

#[derive(Clone, Serialize)]
struct Mark {
    label: String,
}

struct Recorder {
    ctx: SimulationContext,
    log: Vec<(f64, String)>,
}

impl Recorder {
    fn new(ctx: SimulationContext) -> Self {
        Self { ctx, log: Vec::new() }
    }
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Mark { label } => {
                self.log.push((self.ctx.time(), label));
            }
        })
    }
}

fn mark(label: &str) -> Mark {
    Mark {
        label: label.to_string(),
    }
}

fn labels(recorder: &Rc<RefCell<Recorder>>) -> Vec<String> {
    recorder.borrow().log.iter().map(|(_, l)| l.clone()).collect()
}

#[test]
fn test_events_ordered_by_time_then_emission() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());

    ctx.emit_self(mark("E1"), 5.);
    ctx.emit_self(mark("E2"), 5.);
    ctx.emit_self(mark("E3"), 3.);
    sim.step_until_no_events();

    assert_eq!(labels(&recorder), vec!["E3", "E1", "E2"]);
    assert_eq!(sim.time(), 5.);
    assert_eq!(sim.event_count(), 3);
}

#[test]
fn test_priority_breaks_time_ties() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    let id = sim.add_handler("recorder", recorder.clone());

    ctx.emit_with_priority(mark("low"), id, 1., 5);
    ctx.emit_with_priority(mark("high"), id, 1., -1);
    ctx.emit(mark("default"), id, 1.);
    sim.step_until_no_events();

    assert_eq!(labels(&recorder), vec!["high", "default", "low"]);
}

#[test]
fn test_cancelled_event_is_not_delivered() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());

    ctx.emit_self(mark("kept"), 1.);
    let canceled = ctx.emit_self(mark("canceled"), 2.);
    ctx.cancel_event(canceled);
    assert_eq!(sim.pending_event_count(), 1);
    sim.step_until_no_events();

    assert_eq!(labels(&recorder), vec!["kept"]);
    assert_eq!(sim.time(), 1.);
}

#[test]
fn test_removed_handler_drops_incoming_events() {
    let mut sim = Simulation::new(123);
    let sender = sim.create_context("sender");
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx)));
    let id = sim.add_handler("recorder", recorder.clone());

    sender.emit(mark("first"), id, 1.);
    sim.step();
    sender.emit(mark("second"), id, 1.);
    sim.remove_handler("recorder");
    assert_eq!(sim.pending_event_count(), 0);

    // emitted after removal, dropped on delivery
    sender.emit(mark("third"), id, 1.);
    sim.step_until_no_events();

    assert_eq!(labels(&recorder), vec!["first"]);
}

#[test]
fn test_clock_ticks_between_events() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());
    sim.set_clock_tick_interval(Some(1.));

    let ticks = rc!(refcell!(Vec::<TickInfo>::new()));
    let ticks_clone = ticks.clone();
    sim.add_clock_tick_listener(move |tick| ticks_clone.borrow_mut().push(*tick));

    ctx.emit_self(mark("a"), 2.5);
    sim.step_until_no_events();

    let ticks = ticks.borrow();
    let times: Vec<f64> = ticks.iter().map(|t| t.time).collect();
    let indices: Vec<u64> = ticks.iter().map(|t| t.index).collect();
    assert_eq!(times, vec![0., 1., 2.]);
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(sim.time(), 2.5);
}

#[test]
fn test_event_at_tick_boundary_goes_before_tick() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());
    sim.set_clock_tick_interval(Some(1.));

    let order = rc!(refcell!(Vec::<String>::new()));
    let order_clone = order.clone();
    sim.add_clock_tick_listener(move |tick| order_clone.borrow_mut().push(format!("tick@{}", tick.time)));

    ctx.emit_self(mark("a"), 1.);
    sim.step_until_no_events();

    // tick 0 fires before the event, the event at 1.0 does not exceed boundary 1.0
    assert_eq!(*order.borrow(), vec!["tick@0"]);
    assert_eq!(labels(&recorder), vec!["a"]);
}

#[test]
fn test_tick_listener_can_schedule_events() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());
    sim.set_clock_tick_interval(Some(1.));

    let listener_ctx = ctx.clone();
    let listener_id = sim.add_clock_tick_listener(move |tick| {
        if tick.index == 1 {
            listener_ctx.emit_self_now(mark("from tick"));
        }
    });

    ctx.emit_self(mark("late"), 3.5);
    sim.step_until_no_events();
    assert_eq!(labels(&recorder), vec!["from tick", "late"]);
    assert_eq!(recorder.borrow().log[0].0, 1.);

    assert!(sim.remove_clock_tick_listener(listener_id));
    assert!(!sim.remove_clock_tick_listener(listener_id));
}

#[test]
fn test_run_until_does_not_advance_clock_without_events() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());

    ctx.emit_self(mark("a"), 1.);
    ctx.emit_self(mark("b"), 10.);

    assert!(sim.run_until(5.));
    assert_eq!(sim.time(), 1.);
    assert_eq!(labels(&recorder), vec!["a"]);

    assert!(!sim.step_for_duration(20.));
    assert_eq!(sim.time(), 10.);
}

#[test]
fn test_terminate_stops_processing() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = rc!(refcell!(Recorder::new(ctx.clone())));
    sim.add_handler("recorder", recorder.clone());

    ctx.emit_self(mark("a"), 1.);
    ctx.emit_self(mark("b"), 2.);
    ctx.emit_self(mark("c"), 3.);
    sim.terminate_at(2.);
    sim.step_until_no_events();

    assert_eq!(labels(&recorder), vec!["a", "b"]);
    assert_eq!(sim.termination_time(), Some(2.));
    assert_eq!(sim.pending_event_count(), 1);
}

#[test]
fn test_same_seed_gives_same_random_sequence() {
    let mut sim1 = Simulation::new(42);
    let mut sim2 = Simulation::new(42);
    let seq1: Vec<u32> = (0..10).map(|_| sim1.gen_range(0..1000)).collect();
    let seq2: Vec<u32> = (0..10).map(|_| sim2.gen_range(0..1000)).collect();
    assert_eq!(seq1, seq2);
    let ctx = sim1.create_context("comp");
    let x = ctx.rand();
    assert!((0. ..1.).contains(&x));
}

#[derive(Clone, Serialize)]
struct Hop {
    seq: u64,
}

/// Emits two hops with random delays and priorities for every received hop until the budget is spent.
struct Spreader {
    ctx: SimulationContext,
    budget: u32,
    log: Vec<(f64, u64)>,
}

impl EventHandler for Spreader {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Hop { seq } => {
                self.log.push((self.ctx.time(), seq));
                if self.budget > 0 {
                    self.budget -= 1;
                    for child in [seq * 2, seq * 2 + 1] {
                        let delay = self.ctx.gen_range(0. ..3.);
                        let priority = self.ctx.gen_range(-2..3);
                        self.ctx.emit_with_priority(Hop { seq: child }, self.ctx.id(), delay, priority);
                    }
                }
            }
        })
    }
}

fn run_spreader(seed: u64) -> (Vec<(f64, u64)>, Vec<u64>, u64) {
    let mut sim = Simulation::new(seed);
    let ctx = sim.create_context("spreader");
    let spreader = rc!(refcell!(Spreader {
        ctx: ctx.clone(),
        budget: 50,
        log: Vec::new(),
    }));
    sim.add_handler("spreader", spreader.clone());
    sim.set_clock_tick_interval(Some(0.5));
    let ticks = rc!(refcell!(Vec::new()));
    let ticks_clone = ticks.clone();
    sim.add_clock_tick_listener(move |tick: &TickInfo| ticks_clone.borrow_mut().push(tick.index));

    ctx.emit_self_now(Hop { seq: 1 });
    sim.step_until_no_events();
    let log = spreader.borrow().log.clone();
    let ticks = ticks.borrow().clone();
    (log, ticks, sim.event_count())
}

#[test]
fn test_same_seed_gives_same_run() {
    let (log1, ticks1, count1) = run_spreader(42);
    let (log2, ticks2, count2) = run_spreader(42);
    assert_eq!(count1, 101);
    assert_eq!(log1.len(), 101);
    assert_eq!(log1, log2);
    assert_eq!(ticks1, ticks2);
    assert_eq!(count1, count2);

    let (log3, _, _) = run_spreader(43);
    assert_ne!(log1, log3);
}

#[test]
#[should_panic]
fn test_negative_delay_panics() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("comp");
    ctx.emit_self(mark("past"), -1.);
}
