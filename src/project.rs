use std::path::Path;

use crate::canvas::CanvasState;
use crate::components::history::HistoryManager;

/// Single open document.
pub struct Project {
    pub canvas_state: CanvasState,
    pub history: HistoryManager,

    /// Display name (file name or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, canvas_state: CanvasState, history: HistoryManager) -> Self {
        Self {
            canvas_state,
            history,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    pub fn from_file(path: &Path, canvas_state: CanvasState, history: HistoryManager) -> Self {
        Self {
            canvas_state,
            history,
            name: name_from_path(path),
        }
    }
}

fn name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_come_from_the_file_or_the_counter() {
        let untitled = Project::new_untitled(3, CanvasState::new(10, 10), HistoryManager::default());
        assert_eq!(untitled.name, "Untitled-3");

        let opened = Project::from_file(
            Path::new("/tmp/shots/board.smk"),
            CanvasState::new(10, 10),
            HistoryManager::default(),
        );
        assert_eq!(opened.name, "board.smk");

        let rootless = Project::from_file(Path::new("/"), CanvasState::new(1, 1), HistoryManager::default());
        assert_eq!(rootless.name, "Unknown");
    }
}
