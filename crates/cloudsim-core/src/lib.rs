#![warn(missing_docs)]
//! Discrete-event simulation kernel.
//!
//! Components are registered in a [`Simulation`] and interact by emitting events via their [`SimulationContext`].
//! Events are dispatched in the order of `(time, priority, emission order)`. Optionally the simulation
//! fires periodic clock ticks between events, which are delivered to registered tick listeners.

pub mod component;
pub mod context;
pub mod event;
pub mod handler;
pub mod log;
pub mod simulation;
mod state;
pub mod tick;

pub use colored;
pub use component::Id;
pub use context::SimulationContext;
pub use event::{Event, EventData, EventId, DEFAULT_PRIORITY};
pub use handler::EventHandler;
pub use simulation::Simulation;
pub use state::EPSILON;
pub use tick::{ListenerId, TickInfo};
