use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{EditError, Result};
use crate::io::{self, ProjectFile, PROJECT_EXTENSION};
use crate::ops::text::FontBook;
use crate::session::EditSession;
use crate::settings::EditorSettings;

/// Single open document.
pub struct Project {
    pub id: Uuid,
    pub session: EditSession,
    /// `None` for unsaved/untitled documents.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, session: EditSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    /// Open a saved project file into a fresh session.
    pub fn open(path: &Path, settings: EditorSettings, fonts: Arc<FontBook>) -> Result<Self> {
        let file = io::read_project(path)?;
        let source = file
            .source_bitmap()
            .ok_or_else(|| EditError::InvalidProject("Pixel data does not match dimensions".into()))?;
        let session = EditSession::restore(settings, fonts, source, file.composition, file.adjustments, file.brush);
        Ok(Self {
            id: Uuid::new_v4(),
            session,
            path: Some(path.to_path_buf()),
            is_dirty: false,
            name: name_from_path(path),
        })
    }

    /// Write to the current path. Untitled projects need [`Project::save_as`].
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| EditError::InvalidProject("Project has no file path".into()))?;
        self.save_as(&path)
    }

    /// Write to `path` and adopt it. The `.photofe` extension is added when
    /// missing.
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        let mut path = path.to_path_buf();
        if path.extension().is_none() {
            path.set_extension(PROJECT_EXTENSION);
        }
        let file = self.to_file()?;
        io::write_project(&file, &path)?;
        self.path = Some(path);
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn to_file(&self) -> Result<ProjectFile> {
        let source = self
            .session
            .source()
            .ok_or_else(|| EditError::InvalidProject("Nothing to save".into()))?;
        Ok(ProjectFile::new(
            source,
            self.session.composition().clone(),
            *self.session.adjustments(),
            *self.session.brush(),
        ))
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = name_from_path(path);
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
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
    use crate::canvas::{Bitmap, Color};

    fn session() -> EditSession {
        EditSession::with_fonts(EditorSettings::default(), Arc::new(FontBook::offline()))
    }

    #[test]
    fn title_marks_dirty() {
        let mut p = Project::new_untitled(3, session());
        assert_eq!(p.display_title(), "Untitled-3");
        p.mark_dirty();
        assert_eq!(p.display_title(), "Untitled-3*");
    }

    #[test]
    fn untitled_save_needs_a_path() {
        let mut p = Project::new_untitled(1, session());
        p.session.load_bitmap(Bitmap::filled(2, 2, Color::WHITE));
        assert!(matches!(p.save(), Err(EditError::InvalidProject(_))));
    }

    #[test]
    fn empty_session_has_nothing_to_save() {
        let p = Project::new_untitled(1, session());
        assert!(p.to_file().is_err());
    }

    #[test]
    fn save_as_adds_extension_and_cleans() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut p = Project::new_untitled(1, session());
        p.session.load_bitmap(Bitmap::filled(3, 2, Color::WHITE));
        p.mark_dirty();
        p.save_as(&dir.path().join("holiday")).expect("save");
        assert_eq!(p.name, "holiday.photofe");
        assert!(!p.is_dirty);
        assert!(dir.path().join("holiday.photofe").exists());
    }
}
