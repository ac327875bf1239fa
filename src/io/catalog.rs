//! Scene catalog: search and signing collaborators
//!
//! The core never talks to a catalog directly. It goes through
//! [`SceneSearch`] (find scenes for an area and time window) and
//! [`SceneSigner`] (turn a found scene into one whose assets can be fetched).
//! [`SceneCatalog`] pairs the two.

use crate::types::{BoundingBox, SarError, SarResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One file belonging to a scene, e.g. the VV band raster
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAsset {
    pub href: String,
    pub media_type: Option<String>,
    pub roles: Vec<String>,
}

/// A catalogued acquisition as returned by a search
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    pub id: String,
    pub collection: Option<String>,
    /// Acquisition time
    pub datetime: Option<DateTime<Utc>>,
    /// `[min_lon, min_lat, max_lon, max_lat]` footprint
    pub bbox: Option<[f64; 4]>,
    pub properties: HashMap<String, serde_json::Value>,
    pub assets: BTreeMap<String, SceneAsset>,
}

impl SceneDescriptor {
    pub fn new(id: impl Into<String>, datetime: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            collection: None,
            datetime,
            bbox: None,
            properties: HashMap::new(),
            assets: BTreeMap::new(),
        }
    }

    pub fn with_asset(mut self, key: impl Into<String>, href: impl Into<String>) -> Self {
        self.assets.insert(
            key.into(),
            SceneAsset {
                href: href.into(),
                media_type: None,
                roles: vec!["data".to_string()],
            },
        );
        self
    }

    pub fn asset(&self, key: &str) -> Option<&SceneAsset> {
        self.assets.get(key)
    }
}

/// A scene whose asset hrefs can be fetched directly
#[derive(Debug, Clone, PartialEq)]
pub struct SignedScene {
    descriptor: SceneDescriptor,
    expires: Option<DateTime<Utc>>,
}

impl SignedScene {
    pub fn new(descriptor: SceneDescriptor, expires: Option<DateTime<Utc>>) -> Self {
        Self { descriptor, expires }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.descriptor.datetime
    }

    pub fn descriptor(&self) -> &SceneDescriptor {
        &self.descriptor
    }

    pub fn asset(&self, key: &str) -> Option<&SceneAsset> {
        self.descriptor.asset(key)
    }

    /// When the signature stops working, if it ever does
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }
}

/// Lazy sequence of search results; pages are fetched as it is consumed
pub type SceneStream<'a> = Box<dyn Iterator<Item = SarResult<SceneDescriptor>> + Send + 'a>;

/// Lazy sequence of signed scenes
pub type SignedSceneStream<'a> = Box<dyn Iterator<Item = SarResult<SignedScene>> + Send + 'a>;

/// Catalog search collaborator
///
/// The stream is finite and single-use. Nothing matching is an empty stream,
/// not an error.
pub trait SceneSearch: Send + Sync {
    fn search(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<SceneStream<'_>>;
}

/// Scene authorization collaborator; must keep the scene id and timestamp
pub trait SceneSigner: Send + Sync {
    fn sign(&self, scene: SceneDescriptor) -> SarResult<SignedScene>;
}

/// Search plus signing behind one handle
#[derive(Clone)]
pub struct SceneCatalog {
    search: Arc<dyn SceneSearch>,
    signer: Arc<dyn SceneSigner>,
}

impl SceneCatalog {
    pub fn new(search: Arc<dyn SceneSearch>, signer: Arc<dyn SceneSigner>) -> Self {
        Self { search, signer }
    }

    /// Lazily search for scenes intersecting `bbox` within `datetime`
    pub fn search_iter(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<SceneStream<'_>> {
        bbox.validate()?;
        log::debug!(
            "Searching scenes in {:?} for {} (limit {:?})",
            bbox.to_array(),
            datetime,
            limit
        );
        self.search.search(bbox, datetime, limit)
    }

    /// Search and collect every matching scene
    pub fn search(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<Vec<SceneDescriptor>> {
        let scenes = self
            .search_iter(bbox, datetime, limit)?
            .collect::<SarResult<Vec<_>>>()?;
        log::info!("Found {} scenes for {}", scenes.len(), datetime);
        Ok(scenes)
    }

    /// Sign one scene, checking the signer kept its identity
    pub fn sign_scene(&self, scene: SceneDescriptor) -> SarResult<SignedScene> {
        let id = scene.id.clone();
        let datetime = scene.datetime;
        let signed = self.signer.sign(scene)?;

        if signed.id() != id || signed.datetime() != datetime {
            return Err(SarError::Catalog(format!(
                "Signer changed scene identity: {} ({:?}) became {} ({:?})",
                id,
                datetime,
                signed.id(),
                signed.datetime()
            )));
        }
        Ok(signed)
    }

    pub fn sign_scenes(&self, scenes: Vec<SceneDescriptor>) -> SarResult<Vec<SignedScene>> {
        scenes.into_iter().map(|s| self.sign_scene(s)).collect()
    }

    /// Search, then sign every result
    pub fn search_and_sign(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<Vec<SignedScene>> {
        let scenes = self.search(bbox, datetime, limit)?;
        self.sign_scenes(scenes)
    }

    /// Lazy search-and-sign; each scene is signed as it is pulled
    pub fn search_and_sign_iter(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<SignedSceneStream<'_>> {
        let stream = self.search_iter(bbox, datetime, limit)?;
        Ok(Box::new(
            stream.map(move |scene| scene.and_then(|s| self.sign_scene(s))),
        ))
    }
}
