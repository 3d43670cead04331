use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::controller::button::{Button, ButtonCell, ButtonKind};
use crate::controller::monitor::{MonitorHandle, PadInfo};
use crate::persistence::label_store::LabelStore;

// Display palette, assigned by pad index.
const PAD_COLORS: [&str; 8] = [
    "cyan", "rose", "indigo", "emerald", "amber", "lime", "red", "sky",
];

#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("failed to persist pad label: {0}")]
    LabelSave(String),
}

// State shared between a pad and the monitor task: the registry holds one of
// these per watched pad. The observer count covers all buttons of the pad.
#[derive(Debug)]
pub(crate) struct PadCore {
    index: usize,
    monitor: MonitorHandle,
    cells: Vec<Arc<ButtonCell>>,
    observers: Mutex<usize>,
    connected: AtomicBool,
}

impl PadCore {
    pub(crate) fn new(
        index: usize,
        monitor: MonitorHandle,
        cells: Vec<Arc<ButtonCell>>,
        connected: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            monitor,
            cells,
            observers: Mutex::new(0),
            connected: AtomicBool::new(connected),
        })
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn cells(&self) -> &[Arc<ButtonCell>] {
        &self.cells
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Marks every button released.
    pub(crate) fn release_all(&self) {
        for cell in &self.cells {
            cell.set_pressed(false);
        }
    }

    // The watch/unwatch commands are sent while the count lock is held so
    // rapid subscribe/unsubscribe churn cannot reorder them.
    pub(crate) fn observer_added(self: Arc<Self>) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        *observers += 1;
        if *observers == 1 {
            debug!("First observer on pad {}, requesting watch", self.index);
            self.monitor.watch(Arc::clone(&self));
        }
    }

    pub(crate) fn observer_removed(&self) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        *observers -= 1;
        if *observers == 0 {
            debug!("Last observer on pad {} gone, requesting unwatch", self.index);
            self.monitor.unwatch(self.index);
        }
    }
}

/// One gamepad with its subscribable buttons, label and display color.
#[derive(Debug)]
pub struct Pad {
    info: PadInfo,
    label: RwLock<String>,
    labels: Arc<LabelStore>,
    core: Arc<PadCore>,
    buttons: Vec<Button>,
}

impl Pad {
    /// Builds the canonical button set for the pad. The label comes from the
    /// label store, falling back to the hardware name.
    pub async fn new(info: PadInfo, monitor: MonitorHandle, labels: Arc<LabelStore>) -> Self {
        let label = labels
            .label_for(info.index)
            .await
            .unwrap_or_else(|| info.name.clone());

        let cells: Vec<Arc<ButtonCell>> = ButtonKind::ALL
            .iter()
            .map(|&kind| Arc::new(ButtonCell::new(kind, false)))
            .collect();
        let core = PadCore::new(info.index, monitor, cells.clone(), info.connected);
        let buttons = cells
            .iter()
            .map(|cell| Button::new(Arc::clone(cell), Arc::clone(&core)))
            .collect();

        Self {
            info,
            label: RwLock::new(label),
            labels,
            core,
            buttons,
        }
    }

    pub fn index(&self) -> usize {
        self.info.index
    }

    /// Hardware name as reported at enumeration time.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &PadInfo {
        &self.info
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Stable display color derived from the pad index.
    pub fn color(&self) -> &'static str {
        PAD_COLORS[self.info.index % PAD_COLORS.len()]
    }

    /// User-facing name, either stored earlier or the hardware name.
    pub fn label(&self) -> String {
        self.label
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Renames the pad and persists the label immediately.
    pub async fn set_label(&self, label: impl Into<String>) -> Result<(), PadError> {
        let label = label.into();
        {
            let mut current = self.label.write().unwrap_or_else(PoisonError::into_inner);
            *current = label.clone();
        }
        self.labels
            .set_label(self.info.index, &label)
            .await
            .map_err(|e| PadError::LabelSave(e.to_string()))
    }

    pub fn button(&self, kind: ButtonKind) -> &Button {
        &self.buttons[kind as usize]
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    /// Plays a rumble on this pad; `None` uses the monitor's default duration.
    pub fn rumble(&self, duration: Option<Duration>) {
        self.core.monitor.rumble(self.info.index, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::monitor::MonitorHandle;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn test_handle() -> (MonitorHandle, mpsc::Receiver<crate::controller::monitor::MonitorCommand>)
    {
        let (commands, receiver) = mpsc::channel(8);
        let handle = MonitorHandle {
            commands,
            cancel: CancellationToken::new(),
        };
        (handle, receiver)
    }

    fn test_info(index: usize) -> PadInfo {
        PadInfo {
            index,
            name: "Test Pad".to_string(),
            uuid: [0; 16],
            connected: true,
            ff_supported: false,
        }
    }

    async fn test_labels(dir: &tempfile::TempDir) -> Arc<LabelStore> {
        Arc::new(
            LabelStore::open(dir.path().join("labels.toml"))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn color_follows_index_through_palette() {
        let dir = tempfile::tempdir().unwrap();
        let labels = test_labels(&dir).await;

        let (handle, _commands) = test_handle();
        let pad = Pad::new(test_info(9), handle.clone(), Arc::clone(&labels)).await;
        assert_eq!(pad.color(), "rose");

        let pad = Pad::new(test_info(0), handle, labels).await;
        assert_eq!(pad.color(), "cyan");
    }

    #[tokio::test]
    async fn label_falls_back_to_hardware_name() {
        let dir = tempfile::tempdir().unwrap();
        let labels = test_labels(&dir).await;
        let (handle, _commands) = test_handle();

        let pad = Pad::new(test_info(2), handle, labels).await;
        assert_eq!(pad.label(), "Test Pad");
    }

    #[tokio::test]
    async fn stored_label_wins_and_set_label_persists() {
        let dir = tempfile::tempdir().unwrap();
        let labels = test_labels(&dir).await;
        labels.set_label(2, "couch controller").await.unwrap();

        let (handle, _commands) = test_handle();
        let pad = Pad::new(test_info(2), handle, Arc::clone(&labels)).await;
        assert_eq!(pad.label(), "couch controller");

        pad.set_label("desk controller").await.unwrap();
        assert_eq!(pad.label(), "desk controller");

        let reopened = LabelStore::open(dir.path().join("labels.toml"))
            .await
            .unwrap();
        assert_eq!(
            reopened.label_for(2).await.as_deref(),
            Some("desk controller")
        );
    }

    #[tokio::test]
    async fn buttons_are_addressable_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let labels = test_labels(&dir).await;
        let (handle, _commands) = test_handle();

        let pad = Pad::new(test_info(0), handle, labels).await;
        assert_eq!(pad.buttons().len(), ButtonKind::ALL.len());
        for kind in ButtonKind::ALL {
            assert_eq!(pad.button(kind).kind(), kind);
        }
    }

    #[tokio::test]
    async fn release_all_clears_pressed_state() {
        let dir = tempfile::tempdir().unwrap();
        let labels = test_labels(&dir).await;
        let (handle, _commands) = test_handle();

        let pad = Pad::new(test_info(0), handle, labels).await;
        for cell in pad.core.cells() {
            cell.set_pressed(true);
        }
        pad.core.release_all();
        assert!(pad.buttons().iter().all(|button| !button.is_pressed()));
    }
}
