//! RecordProvider - camera and section lookup
//!
//! ## Responsibilities
//!
//! - Resolve camera ids to connection parameters
//! - Resolve section ids to their camera lists
//!
//! ## Backends
//!
//! - `Memory`: JSON inventory file, loaded once at startup
//! - `Database`: MySQL registry tables via sqlx

mod memory;
mod repository;
mod types;

pub use memory::MemoryRecords;
pub use repository::RecordRepository;
pub use types::*;

use crate::error::{Error, Result};
use sqlx::MySqlPool;
use std::path::Path;

enum Backend {
    Memory(MemoryRecords),
    Database(RecordRepository),
}

/// Read-only access to site, section and camera records
pub struct RecordProvider {
    backend: Backend,
}

impl RecordProvider {
    /// Provider over an in-memory inventory
    pub fn in_memory(inventory: Inventory) -> Self {
        Self {
            backend: Backend::Memory(MemoryRecords::from_inventory(inventory)),
        }
    }

    /// Provider over a JSON inventory file
    pub async fn from_file(path: &Path) -> Result<Self> {
        Ok(Self {
            backend: Backend::Memory(MemoryRecords::load(path).await?),
        })
    }

    /// Provider over the MySQL registry
    pub fn database(pool: MySqlPool) -> Self {
        Self {
            backend: Backend::Database(RecordRepository::new(pool)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Memory(_) => "memory",
            Backend::Database(_) => "mysql",
        }
    }

    /// Get camera by ID
    pub async fn get_camera(&self, camera_id: CameraId) -> Result<Camera> {
        let camera = match &self.backend {
            Backend::Memory(records) => records.get_camera(camera_id),
            Backend::Database(repo) => repo.get_camera(camera_id).await?,
        };
        camera.ok_or(Error::CameraNotFound(camera_id))
    }

    /// Get section by ID
    pub async fn get_section(&self, section_id: SectionId) -> Result<Section> {
        let section = match &self.backend {
            Backend::Memory(records) => records.get_section(section_id),
            Backend::Database(repo) => repo.get_section(section_id).await?,
        };
        section.ok_or(Error::SectionNotFound(section_id))
    }

    /// All cameras of a section, active or not.
    ///
    /// Fails with `SectionNotFound` for an unknown section; an existing
    /// section without cameras yields an empty list.
    pub async fn list_cameras_for_section(&self, section_id: SectionId) -> Result<Vec<Camera>> {
        self.get_section(section_id).await?;
        match &self.backend {
            Backend::Memory(records) => Ok(records.cameras_in_section(section_id)),
            Backend::Database(repo) => repo.get_cameras_by_section(section_id).await,
        }
    }

    pub async fn list_cameras(&self) -> Result<Vec<Camera>> {
        match &self.backend {
            Backend::Memory(records) => Ok(records.list_cameras()),
            Backend::Database(repo) => repo.get_cameras().await,
        }
    }

    pub async fn list_active_cameras(&self) -> Result<Vec<Camera>> {
        match &self.backend {
            Backend::Memory(records) => Ok(records.active_cameras()),
            Backend::Database(repo) => repo.get_active_cameras().await,
        }
    }

    pub async fn list_sections(&self) -> Result<Vec<Section>> {
        match &self.backend {
            Backend::Memory(records) => Ok(records.list_sections()),
            Backend::Database(repo) => repo.get_sections().await,
        }
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        match &self.backend {
            Backend::Memory(records) => Ok(records.list_sites()),
            Backend::Database(repo) => repo.get_sites().await,
        }
    }
}
