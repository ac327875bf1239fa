//! Scene signers
//!
//! Planetary Computer serves its assets from Azure blob storage, which needs
//! a shared-access-signature (SAS) token on every request. Tokens are issued
//! per collection and cached until shortly before they expire.

use crate::io::catalog::{SceneDescriptor, SceneSigner, SignedScene};
use crate::types::{SarError, SarResult};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_SAS_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1";

const BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Token response of `GET {sas_url}/token/{collection}`
#[derive(Debug, Clone, Deserialize)]
pub struct SasToken {
    #[serde(rename = "msft:expiry")]
    pub expiry: DateTime<Utc>,
    pub token: String,
}

impl SasToken {
    /// Still usable for at least `margin`
    fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expiry - margin > now
    }
}

/// Signs Azure blob hrefs with Planetary Computer SAS tokens
pub struct PlanetaryComputerSigner {
    sas_url: String,
    client: reqwest::blocking::Client,
    tokens: Mutex<HashMap<String, SasToken>>,
    refresh_margin: Duration,
}

impl PlanetaryComputerSigner {
    pub fn new() -> SarResult<Self> {
        Self::with_sas_url(DEFAULT_SAS_URL)
    }

    pub fn with_sas_url(sas_url: &str) -> SarResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("sarchange/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            sas_url: sas_url.trim_end_matches('/').to_string(),
            client,
            tokens: Mutex::new(HashMap::new()),
            refresh_margin: Duration::minutes(5),
        })
    }

    /// Whether an href points at Azure blob storage and needs a token
    pub fn is_blob_href(href: &str) -> bool {
        let rest = match href.split_once("://") {
            Some((_, rest)) => rest,
            None => return false,
        };
        let host = rest.split(['/', '?']).next().unwrap_or_default();
        host.ends_with(BLOB_HOST_SUFFIX)
    }

    /// Append a SAS token to an href, keeping any existing query
    pub fn sign_href(href: &str, token: &str) -> String {
        if href.contains('?') {
            format!("{}&{}", href, token)
        } else {
            format!("{}?{}", href, token)
        }
    }

    fn cached_token(&self, collection: &str) -> Option<SasToken> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens
            .get(collection)
            .filter(|t| t.is_fresh(Utc::now(), self.refresh_margin))
            .cloned()
    }

    fn fetch_token(&self, collection: &str) -> SarResult<SasToken> {
        let url = format!("{}/token/{}", self.sas_url, collection);
        log::debug!("Requesting SAS token from {}", url);

        let resp = self.client.get(&url).send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(SarError::Catalog(format!(
                "SAS token request returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body = resp.text()?;
        serde_json::from_str(&body)
            .map_err(|e| SarError::Catalog(format!("Parsing SAS token response: {}", e)))
    }

    /// Token for a collection, from cache when still fresh
    pub fn token_for(&self, collection: &str) -> SarResult<SasToken> {
        if let Some(token) = self.cached_token(collection) {
            return Ok(token);
        }

        let token = self.fetch_token(collection)?;
        log::info!("SAS token for {} valid until {}", collection, token.expiry);
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collection.to_string(), token.clone());
        Ok(token)
    }
}

impl SceneSigner for PlanetaryComputerSigner {
    fn sign(&self, mut scene: SceneDescriptor) -> SarResult<SignedScene> {
        if !scene.assets.values().any(|a| Self::is_blob_href(&a.href)) {
            return Ok(SignedScene::new(scene, None));
        }

        let collection = scene.collection.clone().ok_or_else(|| {
            SarError::Catalog(format!("Scene {} has no collection to sign against", scene.id))
        })?;
        let token = self.token_for(&collection)?;

        for asset in scene.assets.values_mut() {
            if Self::is_blob_href(&asset.href) {
                asset.href = Self::sign_href(&asset.href, &token.token);
            }
        }
        Ok(SignedScene::new(scene, Some(token.expiry)))
    }
}

/// Signer for catalogs whose assets are publicly readable
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSigner;

impl SceneSigner for PassthroughSigner {
    fn sign(&self, scene: SceneDescriptor) -> SarResult<SignedScene> {
        Ok(SignedScene::new(scene, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VV: &str = "https://sentinel1euwest.blob.core.windows.net/s1-grd/GRD/2022/1/5/IW/DV/vv.tiff";

    fn scene() -> SceneDescriptor {
        let mut scene = SceneDescriptor::new("S1A_IW_GRDH_20220105", Some(Utc::now()))
            .with_asset("vv", VV)
            .with_asset("thumbnail", "https://planetarycomputer.microsoft.com/preview.png");
        scene.collection = Some("sentinel-1-grd".to_string());
        scene
    }

    fn signer_with_token(expiry: DateTime<Utc>) -> PlanetaryComputerSigner {
        let signer = PlanetaryComputerSigner::new().unwrap();
        signer.tokens.lock().unwrap().insert(
            "sentinel-1-grd".to_string(),
            SasToken {
                expiry,
                token: "st=2022&se=2022&sig=abc".to_string(),
            },
        );
        signer
    }

    #[test]
    fn test_blob_href_detection() {
        assert!(PlanetaryComputerSigner::is_blob_href(VV));
        assert!(!PlanetaryComputerSigner::is_blob_href("https://example.com/vv.tiff"));
        assert!(!PlanetaryComputerSigner::is_blob_href(
            "https://example.com/x.blob.core.windows.net.tiff"
        ));
        assert!(!PlanetaryComputerSigner::is_blob_href("vv.tiff"));
    }

    #[test]
    fn test_sign_href_keeps_query() {
        assert_eq!(PlanetaryComputerSigner::sign_href("https://a/b", "sig=1"), "https://a/b?sig=1");
        assert_eq!(PlanetaryComputerSigner::sign_href("https://a/b?x=1", "sig=1"), "https://a/b?x=1&sig=1");
    }

    #[test]
    fn test_sign_uses_cached_token_for_blob_assets_only() {
        let expiry = Utc::now() + Duration::hours(1);
        let signer = signer_with_token(expiry);
        let original = scene();

        let signed = signer.sign(original.clone()).unwrap();

        assert_eq!(signed.id(), original.id);
        assert_eq!(signed.datetime(), original.datetime);
        assert_eq!(signed.expires(), Some(expiry));
        assert_eq!(signed.asset("vv").unwrap().href, format!("{}?st=2022&se=2022&sig=abc", VV));
        assert_eq!(
            signed.asset("thumbnail").unwrap().href,
            "https://planetarycomputer.microsoft.com/preview.png"
        );
    }

    #[test]
    fn test_token_near_expiry_is_not_reused() {
        let signer = signer_with_token(Utc::now() + Duration::minutes(1));
        assert!(signer.cached_token("sentinel-1-grd").is_none());

        let signer = signer_with_token(Utc::now() + Duration::hours(2));
        assert!(signer.cached_token("sentinel-1-grd").is_some());
    }

    #[test]
    fn test_passthrough_keeps_scene() {
        let original = scene();
        let signed = PassthroughSigner.sign(original.clone()).unwrap();
        assert_eq!(signed.descriptor(), &original);
        assert!(signed.expires().is_none());
    }
}
