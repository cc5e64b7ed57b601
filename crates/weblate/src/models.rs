use std::collections::BTreeSet;

use core_types::{id_from_url, RemoteUnitId, ScreenshotId};
use serde::{Deserialize, Serialize};

use crate::{Result, WeblateError};

/// Screenshot resource as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotInfo {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    pub url: String,
    /// URLs of the source units linked to the screenshot.
    #[serde(default)]
    pub units: Vec<String>,
}

/// Translation unit as returned by the units endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitInfo {
    pub id: u64,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub source_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteScreenshot {
    pub id: ScreenshotId,
    pub name: String,
    pub linked_unit_ids: BTreeSet<RemoteUnitId>,
}

impl RemoteScreenshot {
    pub fn is_linked_to(&self, unit: RemoteUnitId) -> bool {
        self.linked_unit_ids.contains(&unit)
    }
}

impl TryFrom<ScreenshotInfo> for RemoteScreenshot {
    type Error = WeblateError;

    fn try_from(info: ScreenshotInfo) -> Result<Self> {
        // The self URL is authoritative; `id` is not sent by every server version.
        let id = id_from_url(&info.url)
            .or(info.id)
            .ok_or_else(|| WeblateError::Malformed {
                url: info.url.clone(),
                message: "screenshot URL does not end with an id".to_string(),
            })?;

        let mut linked_unit_ids = BTreeSet::new();
        for unit_url in &info.units {
            let unit_id = id_from_url(unit_url).ok_or_else(|| WeblateError::Malformed {
                url: info.url.clone(),
                message: format!("linked unit URL without id: {unit_url}"),
            })?;
            linked_unit_ids.insert(RemoteUnitId(unit_id));
        }

        Ok(Self {
            id: ScreenshotId(id),
            name: info.name,
            linked_unit_ids,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteUnit {
    pub id: RemoteUnitId,
    /// Unit of the source language that screenshots are attached to.
    pub source_unit_id: RemoteUnitId,
    pub context: String,
    pub source: String,
}

impl From<UnitInfo> for RemoteUnit {
    fn from(info: UnitInfo) -> Self {
        let source_unit_id = info
            .source_unit
            .as_deref()
            .and_then(id_from_url)
            .unwrap_or(info.id);
        Self {
            id: RemoteUnitId(info.id),
            source_unit_id: RemoteUnitId(source_unit_id),
            context: info.context,
            source: info.source.into_iter().next().unwrap_or_default(),
        }
    }
}
