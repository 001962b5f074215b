//! Record provider types
//!
//! Site → Section → Camera hierarchy as stored by the site registry.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type SiteId = i64;
pub type SectionId = i64;
pub type CameraId = i64;

/// Default RTSP port when the record leaves it unset
pub const DEFAULT_RTSP_PORT: i32 = 554;

/// Main-stream path used by the deployed camera fleet
pub const DEFAULT_STREAM_PATH: &str = "/cam/realmonitor?channel=1&subtype=0";

/// Top of the hierarchy (one installation)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
}

/// Logical grouping of cameras inside a site
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    #[serde(default)]
    pub site_id: Option<SiteId>,
}

/// Camera record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Camera {
    pub id: CameraId,
    pub name: String,
    pub ip_address: String,
    #[serde(default = "default_port")]
    pub port: i32,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    /// Path and query appended after host:port
    #[serde(default)]
    pub stream_path: Option<String>,
}

fn default_port() -> i32 {
    DEFAULT_RTSP_PORT
}

fn default_active() -> bool {
    true
}

impl Camera {
    /// Connection URL handed to the decoder.
    ///
    /// Credentials are embedded only when both username and password are
    /// present and non-empty; both are percent-encoded.
    pub fn connection_url(&self) -> String {
        let path = self
            .stream_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_STREAM_PATH);
        let path_sep = if path.starts_with('/') { "" } else { "/" };
        let port = if self.port > 0 { self.port } else { DEFAULT_RTSP_PORT };

        let credentials = match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            _ => String::new(),
        };

        format!(
            "rtsp://{}{}:{}{}{}",
            credentials, self.ip_address, port, path_sep, path
        )
    }

    /// Host:port pair used by reachability probes
    pub fn socket_target(&self) -> String {
        let port = if self.port > 0 { self.port } else { DEFAULT_RTSP_PORT };
        format!("{}:{}", self.ip_address, port)
    }
}

/// JSON inventory file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
}
