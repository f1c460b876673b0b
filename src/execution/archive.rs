//! Moves processed inputs into their step's archive folder

use crate::core::context::ProcessingContext;
use crate::core::error::PipelineError;
use crate::core::path::{self, ResolveOptions};
use crate::storage::FileStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an archive would land right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePlan {
    pub directory: String,
    /// Collision-free destination path
    pub target: String,
}

/// Resolves archive destinations and performs the move
pub struct ArchiveResolver {
    store: Arc<dyn FileStore>,
}

impl ArchiveResolver {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// Compute the destination without touching anything
    pub async fn plan(
        &self,
        source: &str,
        pattern: &str,
        ctx: &ProcessingContext,
    ) -> Result<ArchivePlan, PipelineError> {
        let resolved = path::resolve(pattern, &ctx.template_values(), &ResolveOptions::default())?;
        let directory = resolved.resolved_path.trim_end_matches('/').to_string();
        let target = self.free_name(&directory, path::basename(source)).await?;
        Ok(ArchivePlan { directory, target })
    }

    /// Move `source` into the archive and return where it ended up
    ///
    /// A missing source is an error. Anything that goes wrong afterwards is
    /// logged and the source path is returned unchanged.
    pub async fn archive(
        &self,
        source: &str,
        pattern: &str,
        ctx: &ProcessingContext,
    ) -> Result<String, PipelineError> {
        if !self.store.exists(source).await? {
            return Err(PipelineError::SourceNotFound(source.to_string()));
        }

        match self.try_archive(source, pattern, ctx).await {
            Ok(target) => {
                info!("Archived {} -> {}", source, target);
                Ok(target)
            }
            Err(e) => {
                warn!("Failed to archive {}, leaving it in place: {}", source, e);
                Ok(source.to_string())
            }
        }
    }

    async fn try_archive(
        &self,
        source: &str,
        pattern: &str,
        ctx: &ProcessingContext,
    ) -> Result<String, PipelineError> {
        let resolved = path::resolve(pattern, &ctx.template_values(), &ResolveOptions::default())?;
        let directory = resolved.resolved_path.trim_end_matches('/').to_string();
        self.store.ensure_directory(&directory).await?;
        let target = self.free_name(&directory, path::basename(source)).await?;
        self.store.rename(source, &target).await?;
        Ok(target)
    }

    /// First of `name`, `stem-1.ext`, `stem-2.ext`, ... that does not exist
    async fn free_name(&self, directory: &str, name: &str) -> Result<String, PipelineError> {
        let candidate = path::join(directory, name);
        if !self.store.exists(&candidate).await? {
            return Ok(candidate);
        }

        let mut counter = 1u32;
        loop {
            let numbered = path::numbered(name, counter);
            let candidate = path::join(directory, &numbered);
            if !self.store.exists(&candidate).await? {
                debug!("Archive name {} taken, using {}", name, numbered);
                return Ok(candidate);
            }
            counter += 1;
        }
    }
}
