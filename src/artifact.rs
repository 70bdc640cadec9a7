use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::config::AlphaFoldSettings;
use crate::domain::AccessionId;
use crate::error::EnrichError;
use crate::http::{HttpRequest, ReqwestTransport, RetryPolicy, RetryingHttpClient, Transport};

const SERVICE: &str = "AlphaFold files";
const CHUNK_SIZE: usize = 8192;

pub trait ArtifactFetcher: Send + Sync {
    /// Places the structure file for `accession` under `destination_dir` and
    /// returns its path. `source_url` overrides the default download location.
    fn fetch(
        &self,
        accession: &AccessionId,
        source_url: Option<&str>,
        destination_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, EnrichError>;
}

pub fn artifact_path(accession: &AccessionId, destination_dir: &Utf8Path) -> Utf8PathBuf {
    destination_dir.join(format!("{accession}.pdb"))
}

pub struct StructureFileFetcher<T: Transport> {
    http: RetryingHttpClient<T>,
    url_template: String,
}

impl StructureFileFetcher<ReqwestTransport> {
    pub fn from_settings(
        settings: &AlphaFoldSettings,
        policy: RetryPolicy,
    ) -> Result<Self, EnrichError> {
        let transport =
            ReqwestTransport::new(SERVICE, Duration::from_secs(settings.timeout_seconds))?;
        let http = RetryingHttpClient::new(
            SERVICE,
            transport,
            policy,
            Duration::from_millis(settings.min_interval_ms),
        );
        Ok(Self::new(http, settings.file_url_template.clone()))
    }
}

impl<T: Transport> StructureFileFetcher<T> {
    pub fn new(http: RetryingHttpClient<T>, url_template: String) -> Self {
        Self { http, url_template }
    }

    pub fn http(&self) -> &RetryingHttpClient<T> {
        &self.http
    }

    pub fn default_url(&self, accession: &AccessionId) -> String {
        self.url_template.replace("{accession}", accession.as_str())
    }

    fn download(&self, url: &str, target: &Utf8Path, dir: &Utf8Path) -> Result<u64, EnrichError> {
        let response = self.http.execute(&HttpRequest::get(url))?;
        if let Some(content_type) = response.content_type() {
            if content_type.contains("html") {
                warn!(url, content_type, "unexpected content type for structure file");
            }
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".kira-artifact")
            .suffix(".part")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| EnrichError::Filesystem(format!("create temp file in {dir}: {err}")))?;

        let mut body = response.into_body();
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(EnrichError::TransferInterrupted {
                        service: SERVICE.to_string(),
                        message: format!("{url}: {err}"),
                    });
                }
            };
            temp.write_all(&buffer[..read])
                .map_err(|err| EnrichError::Filesystem(format!("write {target}: {err}")))?;
            written += read as u64;
        }

        if written == 0 {
            // Dropping `temp` removes the partial file.
            return Err(EnrichError::MalformedResponse {
                service: SERVICE.to_string(),
                message: format!("empty structure file at {url}"),
            });
        }

        temp.as_file()
            .sync_all()
            .map_err(|err| EnrichError::Filesystem(format!("sync {target}: {err}")))?;
        temp.persist(target.as_std_path())
            .map_err(|err| EnrichError::Filesystem(format!("persist {target}: {}", err.error)))?;
        Ok(written)
    }
}

impl<T: Transport> ArtifactFetcher for StructureFileFetcher<T> {
    fn fetch(
        &self,
        accession: &AccessionId,
        source_url: Option<&str>,
        destination_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, EnrichError> {
        let target = artifact_path(accession, destination_dir);
        if is_complete(&target) {
            info!(%accession, path = %target, "structure file already present");
            return Ok(target);
        }

        fs::create_dir_all(destination_dir.as_std_path()).map_err(|err| {
            EnrichError::Filesystem(format!("create {destination_dir}: {err}"))
        })?;

        let url = match source_url {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => self.default_url(accession),
        };
        debug!(%accession, %url, "downloading structure file");
        let bytes = self.download(&url, &target, destination_dir)?;
        info!(%accession, path = %target, bytes, "structure file saved");
        Ok(target)
    }
}

fn is_complete(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
