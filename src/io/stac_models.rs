//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (`POST /search`) requests and
//! responses, covering what Sentinel-1 GRD searches need: bbox, datetime,
//! collection and property filters, pagination via `links`, and assets.

use crate::io::catalog::{SceneAsset, SceneDescriptor};
use crate::types::{BoundingBox, SarError, SarResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API Item Search).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Page size requested from the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Property filters, e.g. `{"sat:orbit_state": {"eq": "descending"}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Map<String, serde_json::Value>>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, bbox: &BoundingBox) -> Self {
        self.bbox = Some(bbox.to_array().to_vec());
        self
    }

    /// Set datetime or datetime range (e.g. `"2022-01-01/2022-01-31"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Require a property to equal a value.
    pub fn query_eq(mut self, property: &str, value: impl Into<serde_json::Value>) -> Self {
        let mut op = serde_json::Map::new();
        op.insert("eq".to_string(), value.into());
        self.query
            .get_or_insert_with(serde_json::Map::new)
            .insert(property.to_string(), serde_json::Value::Object(op));
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn has_next(&self) -> bool {
        self.next_link().is_some()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,

    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition time from `properties.datetime`
    pub fn acquired(&self) -> SarResult<Option<DateTime<Utc>>> {
        match self.properties.datetime.as_deref() {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| {
                    SarError::Catalog(format!("Item {} has bad datetime '{}': {}", self.id, raw, e))
                }),
        }
    }

    /// Convert into the catalog-neutral scene description
    pub fn into_scene(self) -> SarResult<SceneDescriptor> {
        let datetime = self.acquired()?;
        let bbox = match self.bbox.as_deref() {
            Some([w, s, e, n]) => Some([*w, *s, *e, *n]),
            // 3D bboxes carry elevation after each corner
            Some([w, s, _, e, n, _]) => Some([*w, *s, *e, *n]),
            _ => None,
        };

        let mut properties = self.properties.extra;
        if let Some(platform) = self.properties.platform {
            properties.insert("platform".to_string(), platform.into());
        }
        if let Some(orbit) = self.properties.orbit_state {
            properties.insert("sat:orbit_state".to_string(), orbit.into());
        }
        if let Some(mode) = self.properties.instrument_mode {
            properties.insert("sar:instrument_mode".to_string(), mode.into());
        }
        if let Some(pols) = self.properties.polarizations {
            properties.insert("sar:polarizations".to_string(), pols.into());
        }

        let assets = self
            .assets
            .into_iter()
            .map(|(key, a)| {
                (
                    key,
                    SceneAsset {
                        href: a.href,
                        media_type: a.type_,
                        roles: a.roles.unwrap_or_default(),
                    },
                )
            })
            .collect();

        Ok(SceneDescriptor {
            id: self.id,
            collection: self.collection,
            datetime,
            bbox,
            properties,
            assets,
        })
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Platform name (e.g., "SENTINEL-1A").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(rename = "sat:orbit_state", skip_serializing_if = "Option::is_none")]
    pub orbit_state: Option<String>,

    #[serde(rename = "sar:instrument_mode", skip_serializing_if = "Option::is_none")]
    pub instrument_mode: Option<String>,

    #[serde(rename = "sar:polarizations", skip_serializing_if = "Option::is_none")]
    pub polarizations: Option<Vec<String>>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Merge mode: if true, merge body with previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

impl StacLink {
    /// Request body for following this link after a search with `previous`.
    ///
    /// Returns `None` for GET links.
    pub fn next_body(&self, previous: &StacSearchParams) -> SarResult<Option<StacSearchParams>> {
        let method = self.method.as_deref().unwrap_or("GET").to_uppercase();
        if method != "POST" {
            return Ok(None);
        }

        let body = match (&self.body, self.merge.unwrap_or(false)) {
            (Some(link_body), true) => {
                let mut base = serde_json::to_value(previous)?;
                if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                    for (k, v) in link_obj {
                        base_obj.insert(k.clone(), v.clone());
                    }
                }
                base
            }
            (Some(link_body), false) => link_body.clone(),
            (None, _) => serde_json::to_value(previous)?,
        };

        Ok(Some(serde_json::from_value(body)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
