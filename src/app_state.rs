use crate::analysis::{Analyser, DatasetConfig};
use crate::boundaries::BoundaryIndex;
use crate::cli::CommandLineArgs;
use crate::coord_cache::{CacheStore, DiskCacheStore, MemoryCacheStore};
use crate::error::AnalysisError;
use crate::resource_manager::ResourceManager;
use crate::session::SessionRegistry;
use crate::zarr::{ArrayReader, ZarrArrayReader};

use expanduser::expanduser;
use std::path::Path;
use std::sync::Arc;

/// Shared application state passed to each request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: Arc<ResourceManager>,

    /// Analyser for the configured dataset.
    pub analyser: Analyser,

    /// Live analysis sessions.
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Create and return an [AppState].
    ///
    /// Fails if the coordinate cache or the boundary collection cannot be opened.
    pub fn new(args: &CommandLineArgs) -> Result<Self, AnalysisError> {
        let resource_manager = Arc::new(ResourceManager::new(
            args.connection_limit,
            args.thread_limit,
        ));
        let reader: Arc<dyn ArrayReader> =
            Arc::new(ZarrArrayReader::new(resource_manager.clone()));
        let cache_store: Arc<dyn CacheStore> = if args.use_coord_cache {
            let path = expanduser(&args.coord_cache_path).map_err(|err| {
                AnalysisError::CacheStorage {
                    error: format!("{}: {}", args.coord_cache_path, err),
                }
            })?;
            Arc::new(DiskCacheStore::new(&path.to_string_lossy())?)
        } else {
            Arc::new(MemoryCacheStore::new())
        };
        let boundaries = match &args.boundaries_path {
            Some(path) => {
                let path = expanduser(path).map_err(|err| AnalysisError::BoundaryLoad {
                    error: format!("{}: {}", path, err),
                })?;
                Some(BoundaryIndex::load(Path::new(&path))?)
            }
            None => None,
        };
        let config = DatasetConfig {
            url: args.dataset_url.as_str().trim_end_matches('/').to_string(),
            time_origin: args.time_origin,
            padding_cells: args.padding_cells,
            default_threshold: args.default_threshold,
            use_rayon: args.use_rayon,
        };
        let analyser = Analyser::new(
            config,
            reader,
            cache_store,
            boundaries,
            resource_manager.clone(),
        );

        Ok(Self {
            args: args.clone(),
            resource_manager,
            analyser,
            sessions: SessionRegistry::new(),
        })
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
