//! Image freeze/serialize/load using commit and export/import

use crate::archive::{self, split_image_ref};
use crate::{is_not_found, DockerEngine, EngineError, Result};
use bollard::container::Config as ContainerConfig;
use bollard::image::{
    CommitContainerOptions, CreateImageOptions, ImportImageOptions, RemoveImageOptions,
};
use futures::{StreamExt, TryStreamExt};
use std::io;
use std::path::Path;
use tracing::{debug, info, instrument};

impl DockerEngine {
    /// Commit the container's filesystem as `image_ref`
    #[instrument(skip(self))]
    pub(crate) async fn commit(&self, container_id: &str, image_ref: &str) -> Result<()> {
        let (repo, tag) = split_image_ref(image_ref);
        let options = CommitContainerOptions {
            container: container_id.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
            comment: format!("boxkeep snapshot of {container_id}"),
            author: "boxkeep".to_string(),
            pause: true, // Pause container during commit for consistency
            ..Default::default()
        };

        self.docker
            .commit_container(options, ContainerConfig::<String>::default())
            .await
            .map_err(EngineError::CommitFailed)?;

        info!("Committed container {} as {}", container_id, image_ref);
        Ok(())
    }

    /// Stream `docker save` output through gzip into `dest`, returning the
    /// uncompressed size. Compression and file writes happen on a blocking task.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub(crate) async fn save(&self, image_ref: &str, dest: &Path) -> Result<u64> {
        let (tx, writer) = archive::spawn_gzip_writer(dest.to_path_buf());

        let mut stream = Box::pin(self.docker.export_image(image_ref));
        let mut export_error = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    // A closed channel means the writer failed; its error is reported below
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    export_error = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let written = writer.await.map_err(io::Error::other)?;
        if let Some(e) = export_error {
            return Err(EngineError::ExportFailed(e));
        }
        let written = written?;

        info!("Saved image {} ({} bytes before compression)", image_ref, written);
        Ok(written)
    }

    /// Feed the decompressed archive to the engine chunk by chunk
    #[instrument(skip(self, archive), fields(archive = %archive.display()))]
    pub(crate) async fn load(&self, archive: &Path) -> Result<()> {
        let (chunks, reader) = archive::gunzip_chunks(archive.to_path_buf(), archive::CHUNK_SIZE);

        let mut import_error = None;
        let mut progress = Box::pin(self.docker.import_image_stream(
            ImportImageOptions { quiet: true },
            chunks,
            None,
        ));
        while let Some(info) = progress.next().await {
            match info {
                Ok(info) => {
                    if let Some(stream) = info.stream {
                        debug!("{}", stream.trim_end());
                    }
                }
                Err(e) => {
                    import_error = Some(e.to_string());
                    break;
                }
            }
        }
        // Dropping the request releases a reader blocked on a full channel
        drop(progress);

        let read = reader
            .await
            .map_err(|e| EngineError::ImportFailed(format!("decompression task failed: {e}")))?;
        match (read, import_error) {
            // A broken pipe only means the engine stopped reading; its own error says why
            (Err(e), _) if e.kind() != io::ErrorKind::BrokenPipe => Err(EngineError::ImportFailed(
                format!("{}: {e}", archive.display()),
            )),
            (_, Some(error)) => Err(EngineError::ImportFailed(error)),
            (Err(e), None) => Err(EngineError::ImportFailed(e.to_string())),
            (Ok(bytes), None) => {
                info!("Loaded image archive {} ({} bytes)", archive.display(), bytes);
                Ok(())
            }
        }
    }

    pub(crate) async fn remove(&self, image_ref: &str) -> Result<()> {
        self.docker
            .remove_image(
                image_ref,
                Some(RemoveImageOptions {
                    force: false,
                    ..Default::default()
                }),
                None,
            )
            .await?;
        info!("Removed image {}", image_ref);
        Ok(())
    }

    pub(crate) async fn has_image(&self, image_ref: &str) -> Result<bool> {
        match self.docker.inspect_image(image_ref).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn pull_if_missing(&self, image_ref: &str) -> Result<()> {
        if self.has_image(image_ref).await? {
            return Ok(());
        }

        info!("Pulling helper image {}", image_ref);
        let (repo, tag) = split_image_ref(image_ref);
        let options = CreateImageOptions {
            from_image: repo.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(EngineError::PullFailed)?;
        Ok(())
    }
}
