//! Controller subsystem for gamepad button monitoring
//!
//! Implements a subscription-driven polling pipeline:
//!
//! 1. [`monitor`] - Shared poll loop owning the gilrs context
//! 2. [`pad`] - Per-gamepad state, labels and observer accounting
//! 3. [`button`] - Subscribable pressed state per button
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Monitor ──► ButtonCell ──► Subscribers
//!             (frames)    (edges only)   (watch channels)
//! ```
//!
//! The monitor runs as a single tokio task. Its frame timer is active only
//! while at least one button subscription exists somewhere; observers are
//! reference-counted per pad across all of that pad's buttons.

pub mod button;
pub mod monitor;
pub mod pad;

pub use button::{Button, ButtonClosed, ButtonKind, ButtonSubscription};
pub use monitor::{MonitorError, MonitorHandle, MonitorSettings, PadInfo};
pub use pad::{Pad, PadError};
