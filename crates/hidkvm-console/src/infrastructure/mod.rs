//! Infrastructure layer for the console.
//!
//! Contains OS-facing adapters: input capture sources, the serial packet
//! transport, the video pump, and file-system storage.  [`backend`] wires
//! the production adapters into a [`crate::application::session::SessionBackend`].
//!
//! **Dependency rule**: only `backend` and `storage::config` name
//! `application` types, to build a backend and a session snapshot.  The
//! adapters themselves depend on `hidkvm_core` alone.

pub mod backend;
pub mod input_capture;
pub mod storage;
pub mod transport;
pub mod video;
