//! Domain entities for HidKvm.
//!
//! This module contains pure logic with no infrastructure dependencies.
//!
//! # What is "domain" here? (for beginners)
//!
//! The innermost layer holds the types every other layer talks in.  For a
//! serial KVM that is the canonical input event (one shape, whatever window
//! system or OS hook produced it) and the geometry that relates the video
//! widget on the operator's screen to the remote machine's screen.
//!
//! Nothing in here touches a window, a serial port or a clock, so it can be
//! compiled and tested on any platform without external setup.

/// Canonical keyboard and pointer events.
pub mod input;

/// Letterbox-aware mapping from widget pixels to remote screen pixels.
pub mod geometry;
