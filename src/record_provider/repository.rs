//! Record repository
//!
//! Database access layer for sites, sections and cameras

use super::types::*;
use crate::error::Result;
use sqlx::MySqlPool;

/// Read-only repository over the site registry tables
#[derive(Clone)]
pub struct RecordRepository {
    pool: MySqlPool,
}

impl RecordRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Camera SELECT columns
    const CAMERA_COLUMNS: &'static str = r#"
        id, name, ip_address, port, username, password,
        is_active, section_id, stream_path
    "#;

    /// Get camera by ID
    pub async fn get_camera(&self, camera_id: CameraId) -> Result<Option<Camera>> {
        let query = format!("SELECT {} FROM cameras WHERE id = ?", Self::CAMERA_COLUMNS);
        let camera = sqlx::query_as::<_, Camera>(&query)
            .bind(camera_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(camera)
    }

    /// Get cameras belonging to a section (active and inactive)
    pub async fn get_cameras_by_section(&self, section_id: SectionId) -> Result<Vec<Camera>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE section_id = ? ORDER BY id",
            Self::CAMERA_COLUMNS
        );
        let cameras = sqlx::query_as::<_, Camera>(&query)
            .bind(section_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(cameras)
    }

    /// Get all cameras
    pub async fn get_cameras(&self) -> Result<Vec<Camera>> {
        let query = format!("SELECT {} FROM cameras ORDER BY id", Self::CAMERA_COLUMNS);
        let cameras = sqlx::query_as::<_, Camera>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(cameras)
    }

    /// Get all active cameras
    pub async fn get_active_cameras(&self) -> Result<Vec<Camera>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE is_active = TRUE ORDER BY id",
            Self::CAMERA_COLUMNS
        );
        let cameras = sqlx::query_as::<_, Camera>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(cameras)
    }

    /// Get section by ID
    pub async fn get_section(&self, section_id: SectionId) -> Result<Option<Section>> {
        let section = sqlx::query_as::<_, Section>(
            "SELECT id, name, site_id FROM sections WHERE id = ?",
        )
        .bind(section_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(section)
    }

    /// Get all sections
    pub async fn get_sections(&self) -> Result<Vec<Section>> {
        let sections =
            sqlx::query_as::<_, Section>("SELECT id, name, site_id FROM sections ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(sections)
    }

    /// Get all sites
    pub async fn get_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>("SELECT id, name FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(sites)
    }
}
