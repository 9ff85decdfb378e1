//! Application layer use cases for the console.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `hidkvm-core`) and the infrastructure (serial ports, OS
//! hooks, capture devices).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** core types to fulfil an operator goal (e.g., "press the
//!   key I just pressed on the remote machine").
//! - **Depend on abstractions** (`PacketSink`, `InputSource`, `VideoSource`)
//!   so tests can swap in recording and mock implementations.
//! - **Open nothing themselves**: every OS resource comes through the
//!   [`session::SessionBackend`] factory.
//!
//! # Sub-modules
//!
//! - **`normalize_input`** – Turns raw events from either capture source into
//!   canonical events and owns the modifier mask.
//!
//! - **`translate_input`** – Turns canonical events into CH9329 packets.  It
//!   runs on every keystroke and mouse movement.
//!
//! - **`session`** – The start/stop state machine and the dispatch thread.
//!
//! - **`session_config`** – The immutable settings snapshot a session runs with.

pub mod normalize_input;
pub mod session;
pub mod session_config;
pub mod translate_input;
