use std::path::Path;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::utils::normalize_path;

/// Minimum quiet period after the last dispatch before the next one.
pub(super) const DISPATCH_COOLDOWN_MS: u64 = 500;

/// Pure debouncer: only handles timing and path coalescing.
/// No registration lookups, no callback dispatch.
///
/// Every surviving notify event is a potential rebuild trigger here, so
/// unlike a create/modify/remove classifier the debouncer only needs the
/// set of touched paths — a removed source is rebuilt (and fails) the
/// same way a modified one is rebuilt.
pub(super) struct Debouncer {
    pub(super) changed: FxHashSet<std::path::PathBuf>,
    pub(super) last_event: Option<Instant>,
    pub(super) last_dispatch: Option<Instant>,
    debounce: Duration,
}

impl Debouncer {
    pub(super) fn new(debounce: Duration) -> Self {
        Self {
            changed: FxHashSet::default(),
            last_event: None,
            last_dispatch: None,
            debounce,
        }
    }

    /// Record a notify event, dropping metadata-only noise and editor
    /// temp files.
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(modify) => {
                // Ignore metadata-only changes (mtime/atime/chmod noise)
                // may trigger endless rebuild loops
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
            }
            _ => return,
        }

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }

            let path = normalize_path(path);
            crate::debug!("watch"; "event {:?}: {}", event.kind, path.display());
            self.changed.insert(path);
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the coalesced path set if debounce + cooldown elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<FxHashSet<std::path::PathBuf>> {
        if !self.is_ready() {
            return None;
        }

        let changed = std::mem::take(&mut self.changed);
        self.last_event = None;

        if changed.is_empty() {
            return None;
        }

        self.last_dispatch = Some(Instant::now());
        Some(changed)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < self.debounce {
            return false;
        }

        if let Some(last_dispatch) = self.last_dispatch
            && last_dispatch.elapsed() < Duration::from_millis(DISPATCH_COOLDOWN_MS)
        {
            return false;
        }

        !self.changed.is_empty()
    }

    /// Precise sleep duration until next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining = self.debounce.saturating_sub(last_event.elapsed());

        let cooldown_remaining = self
            .last_dispatch
            .map(|t| Duration::from_millis(DISPATCH_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
