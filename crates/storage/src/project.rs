use crate::disk::{Disk, OsDisk};
use crate::{StorageError, StorageResult};
use doc_model::{Page, PageMetadata, Project};
use scanlate_core::{codec, FlatExportConfig, ImportReport, Session};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Page image to register in a new project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    /// Image path relative to the container
    pub image: String,
    pub width: u32,
    pub height: u32,
}

/// Reads and writes project containers
///
/// Every write goes to a temporary file next to the target, is synced, and
/// then renamed over the target. A failed write leaves the previous file
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore<D = OsDisk> {
    disk: D,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Disk> ProjectStore<D> {
    pub fn with_disk(disk: D) -> Self {
        Self { disk }
    }

    /// Decode the container at `path`
    pub fn open(&self, path: &Path) -> StorageResult<Project> {
        let bytes = self
            .disk
            .read(path)
            .map_err(|source| StorageError::ReadFailed { path: path.to_path_buf(), source })?;
        let project = codec::decode(&bytes)?;
        tracing::info!(
            path = %path.display(),
            pages = project.pages().len(),
            regions = project.region_count(),
            "opened project"
        );
        Ok(project)
    }

    /// Encode `project` and replace the container at `path`
    pub fn save(&self, project: &Project, path: &Path) -> StorageResult<()> {
        let bytes = codec::encode(project)?;
        self.write_atomic(path, &bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "saved project");
        Ok(())
    }

    /// Save the session's project and mark the session clean
    pub fn save_session(&self, session: &mut Session, path: &Path) -> StorageResult<()> {
        self.save(session.project(), path)?;
        session.mark_saved();
        Ok(())
    }

    /// Create a project with one page per image and save it to `path`.
    /// Refuses to overwrite an existing file.
    pub fn new_project(
        &self,
        path: &Path,
        name: &str,
        pages: &[NewPage],
    ) -> StorageResult<Project> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut project = Project::new(name);
        for new_page in pages {
            let id = project.allocate_page_id()?;
            let metadata = PageMetadata::new(new_page.width, new_page.height);
            project.push_page(Page::new(id, new_page.image.clone(), metadata))?;
        }
        self.save(&project, path)?;
        Ok(project)
    }

    /// Write the flat text sheet of `project` to `path`. Returns the number
    /// of rows written.
    pub fn export_text(
        &self,
        project: &Project,
        path: &Path,
        config: &FlatExportConfig,
    ) -> StorageResult<usize> {
        let mut bytes = Vec::new();
        let rows = scanlate_core::export_text(&mut bytes, project, config)?;
        self.write_atomic(path, &bytes)?;
        tracing::info!(path = %path.display(), rows, "exported flat text");
        Ok(rows)
    }

    /// Apply the translations in the sheet at `path` to the session as one
    /// undo step
    pub fn import_text(
        &self,
        session: &mut Session,
        path: &Path,
        config: &FlatExportConfig,
    ) -> StorageResult<ImportReport> {
        let bytes = self
            .disk
            .read(path)
            .map_err(|source| StorageError::ReadFailed { path: path.to_path_buf(), source })?;
        Ok(session.import_text(bytes.as_slice(), config)?)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let failed = |source| StorageError::SaveFailed { path: path.to_path_buf(), source };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = NamedTempFile::new_in(&dir).map_err(failed)?;
        self.disk.write(temp.as_file_mut(), bytes).map_err(failed)?;
        temp.as_file_mut().flush().map_err(failed)?;
        temp.as_file().sync_all().map_err(failed)?;
        temp.persist(path).map_err(|error| failed(error.error))?;
        Ok(())
    }
}
