//! Catalog search, scene signing and raster loading

pub mod catalog;
pub mod data_loader;
pub mod signing;
pub mod stac_client;
pub mod stac_models;

pub use catalog::{
    SceneAsset, SceneCatalog, SceneDescriptor, SceneSearch, SceneSigner, SceneStream, SignedScene,
    SignedSceneStream,
};
pub use data_loader::{BandOptions, LoadRequest, RasterLoader, SarDataLoader};
pub use signing::{PassthroughSigner, PlanetaryComputerSigner, SasToken};
pub use stac_client::{StacClient, StacClientOptions, StacItemPages};
