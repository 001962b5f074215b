//! In-memory record store backed by a JSON inventory file

use super::types::*;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable snapshot of the inventory, indexed by id
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    sites: BTreeMap<SiteId, Site>,
    sections: BTreeMap<SectionId, Section>,
    cameras: BTreeMap<CameraId, Camera>,
}

impl MemoryRecords {
    pub fn from_inventory(inventory: Inventory) -> Self {
        Self {
            sites: inventory.sites.into_iter().map(|s| (s.id, s)).collect(),
            sections: inventory.sections.into_iter().map(|s| (s.id, s)).collect(),
            cameras: inventory.cameras.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    /// Load from a JSON file of shape `{sites, sections, cameras}`
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("cannot read inventory {}: {}", path.display(), e))
        })?;
        let inventory: Inventory = serde_json::from_str(&raw)?;

        tracing::info!(
            path = %path.display(),
            sites = inventory.sites.len(),
            sections = inventory.sections.len(),
            cameras = inventory.cameras.len(),
            "Inventory loaded"
        );

        Ok(Self::from_inventory(inventory))
    }

    pub fn get_camera(&self, camera_id: CameraId) -> Option<Camera> {
        self.cameras.get(&camera_id).cloned()
    }

    pub fn get_section(&self, section_id: SectionId) -> Option<Section> {
        self.sections.get(&section_id).cloned()
    }

    pub fn list_sections(&self) -> Vec<Section> {
        self.sections.values().cloned().collect()
    }

    pub fn list_sites(&self) -> Vec<Site> {
        self.sites.values().cloned().collect()
    }

    pub fn cameras_in_section(&self, section_id: SectionId) -> Vec<Camera> {
        self.cameras
            .values()
            .filter(|c| c.section_id == Some(section_id))
            .cloned()
            .collect()
    }

    pub fn list_cameras(&self) -> Vec<Camera> {
        self.cameras.values().cloned().collect()
    }

    pub fn active_cameras(&self) -> Vec<Camera> {
        self.cameras.values().filter(|c| c.is_active).cloned().collect()
    }
}
