use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::controller::pad::PadCore;

// Canonical button layout exposed for every pad, mapped onto gilrs names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonKind {
    A,
    B,
    X,
    Y,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Guide,
}

impl ButtonKind {
    /// Every button kind, in declaration order.
    pub const ALL: [ButtonKind; 17] = [
        ButtonKind::A,
        ButtonKind::B,
        ButtonKind::X,
        ButtonKind::Y,
        ButtonKind::Start,
        ButtonKind::Select,
        ButtonKind::LeftBumper,
        ButtonKind::RightBumper,
        ButtonKind::LeftTrigger,
        ButtonKind::RightTrigger,
        ButtonKind::LeftStick,
        ButtonKind::RightStick,
        ButtonKind::DPadUp,
        ButtonKind::DPadDown,
        ButtonKind::DPadLeft,
        ButtonKind::DPadRight,
        ButtonKind::Guide,
    ];

    pub(crate) fn to_gilrs(self) -> gilrs::Button {
        match self {
            ButtonKind::A => gilrs::Button::South,
            ButtonKind::B => gilrs::Button::East,
            ButtonKind::X => gilrs::Button::West,
            ButtonKind::Y => gilrs::Button::North,
            ButtonKind::Start => gilrs::Button::Start,
            ButtonKind::Select => gilrs::Button::Select,
            ButtonKind::LeftBumper => gilrs::Button::LeftTrigger,
            ButtonKind::RightBumper => gilrs::Button::RightTrigger,
            ButtonKind::LeftTrigger => gilrs::Button::LeftTrigger2,
            ButtonKind::RightTrigger => gilrs::Button::RightTrigger2,
            ButtonKind::LeftStick => gilrs::Button::LeftThumb,
            ButtonKind::RightStick => gilrs::Button::RightThumb,
            ButtonKind::DPadUp => gilrs::Button::DPadUp,
            ButtonKind::DPadDown => gilrs::Button::DPadDown,
            ButtonKind::DPadLeft => gilrs::Button::DPadLeft,
            ButtonKind::DPadRight => gilrs::Button::DPadRight,
            ButtonKind::Guide => gilrs::Button::Mode,
        }
    }
}

// Pressed-state cell shared between the pad and the monitor task. The monitor
// writes it each frame, subscribers observe it through the watch channel.
#[derive(Debug)]
pub(crate) struct ButtonCell {
    kind: ButtonKind,
    state: watch::Sender<bool>,
}

impl ButtonCell {
    pub(crate) fn new(kind: ButtonKind, pressed: bool) -> Self {
        let (state, _) = watch::channel(pressed);
        Self { kind, state }
    }

    pub(crate) fn kind(&self) -> ButtonKind {
        self.kind
    }

    pub(crate) fn pressed(&self) -> bool {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    // Publishes only on an actual press/release edge.
    pub(crate) fn set_pressed(&self, pressed: bool) {
        self.state.send_if_modified(|current| {
            if *current != pressed {
                *current = pressed;
                true
            } else {
                false
            }
        });
    }
}

/// The pad owning this button is gone.
#[derive(Debug, thiserror::Error)]
#[error("button state source was dropped")]
pub struct ButtonClosed;

/// Pressed state of a single pad button.
#[derive(Debug)]
pub struct Button {
    cell: Arc<ButtonCell>,
    core: Arc<PadCore>,
}

impl Button {
    pub(crate) fn new(cell: Arc<ButtonCell>, core: Arc<PadCore>) -> Self {
        Self { cell, core }
    }

    pub fn kind(&self) -> ButtonKind {
        self.cell.kind()
    }

    pub fn is_pressed(&self) -> bool {
        self.cell.pressed()
    }

    /// Registers an observer. The first observer on a pad starts the shared
    /// poll loop for it, so the returned subscription must be kept alive for
    /// as long as updates are wanted.
    pub fn subscribe(&self) -> ButtonSubscription {
        let changes = self.cell.watch();
        Arc::clone(&self.core).observer_added();
        debug!("New subscriber for {:?} on pad {}", self.kind(), self.core.index());
        ButtonSubscription {
            changes,
            core: Arc::clone(&self.core),
        }
    }
}

/// Observer registration for one button. Dropping it deregisters the observer
/// and, when it was the pad's last one, stops polling the pad.
#[derive(Debug)]
pub struct ButtonSubscription {
    changes: watch::Receiver<bool>,
    core: Arc<PadCore>,
}

impl ButtonSubscription {
    /// Pressed state as of the latest published update.
    pub fn pressed(&self) -> bool {
        *self.changes.borrow()
    }

    /// Waits for the next press/release edge and returns the new state.
    pub async fn changed(&mut self) -> Result<bool, ButtonClosed> {
        self.changes.changed().await.map_err(|_| ButtonClosed)?;
        Ok(*self.changes.borrow_and_update())
    }
}

impl Drop for ButtonSubscription {
    fn drop(&mut self) {
        self.core.observer_removed();
    }
}
