use crate::error::IngestError;
use crate::models::{FileKind, Fragment, FragmentMetadata};
use async_trait::async_trait;
use lopdf::Document;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Produces the raw fragments for one pipeline run.
#[async_trait]
pub trait FragmentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Fragment>, IngestError>;
}

/// Maps lowercase file extensions to how their text is extracted.
#[derive(Debug, Clone)]
pub struct LoaderStrategy {
    kinds: HashMap<String, FileKind>,
}

impl Default for LoaderStrategy {
    fn default() -> Self {
        Self::empty()
            .with("pdf", FileKind::PageOriented)
            .with("ppt", FileKind::WholeFile)
            .with("pptx", FileKind::WholeFile)
            .with("doc", FileKind::WholeFile)
            .with("docx", FileKind::WholeFile)
    }
}

impl LoaderStrategy {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn with(mut self, extension: &str, kind: FileKind) -> Self {
        self.kinds.insert(extension.to_ascii_lowercase(), kind);
        self
    }

    pub fn kind_for(&self, path: &Path) -> Option<FileKind> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.kinds.get(&extension).copied()
    }
}

pub fn discover_files(folder: &Path, strategy: &LoaderStrategy) -> Vec<(PathBuf, FileKind)> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        match strategy.kind_for(entry.path()) {
            Some(kind) => files.push((entry.path().to_path_buf(), kind)),
            None => debug!(path = %entry.path().display(), "unsupported file type, ignoring"),
        }
    }

    files.sort_unstable_by(|left, right| left.0.cmp(&right.0));
    files
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        document
            .get_pages()
            .into_keys()
            .map(|number| {
                let text = document
                    .extract_text(&[number])
                    .map_err(|error| IngestError::PdfParse(error.to_string()))?;
                Ok::<_, IngestError>(PageText { number, text })
            })
            .collect()
    }
}

/// Turns a whole file into an ordered list of text elements.
#[async_trait]
pub trait WholeFileExtractor: Send + Sync {
    async fn extract_elements(&self, path: &Path) -> Result<Vec<String>, IngestError>;
}

#[derive(Debug, Deserialize)]
struct UnstructuredElement {
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Unstructured partition API.
pub struct UnstructuredClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl UnstructuredClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/general/v0/general", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }
}

#[async_trait]
impl WholeFileExtractor for UnstructuredClient {
    async fn extract_elements(&self, path: &Path) -> Result<Vec<String>, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = file_name(path)?;
        let form = Form::new().part("files", Part::bytes(bytes).file_name(filename));

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.header("unstructured-api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::ExtractionFailed(format!(
                "{} returned {} for {}",
                self.endpoint,
                response.status(),
                path.display()
            )));
        }

        let elements: Vec<UnstructuredElement> = response.json().await?;
        Ok(element_texts(elements))
    }
}

fn element_texts(elements: Vec<UnstructuredElement>) -> Vec<String> {
    elements
        .into_iter()
        .filter_map(|element| element.text)
        .collect()
}

fn file_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

pub struct DirectoryLoader<W> {
    folder: PathBuf,
    strategy: LoaderStrategy,
    pdf: LopdfExtractor,
    whole_file: W,
}

impl<W> DirectoryLoader<W>
where
    W: WholeFileExtractor,
{
    pub fn new(folder: impl Into<PathBuf>, whole_file: W) -> Self {
        Self {
            folder: folder.into(),
            strategy: LoaderStrategy::default(),
            pdf: LopdfExtractor,
            whole_file,
        }
    }

    pub fn with_strategy(mut self, strategy: LoaderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    async fn load_file(&self, path: &Path, kind: FileKind) -> Result<Vec<Fragment>, IngestError> {
        let filename = file_name(path)?;
        match kind {
            FileKind::PageOriented => {
                let source_path = path.to_string_lossy().to_string();
                let pages = self.pdf.extract_pages(path)?;
                Ok(pages
                    .into_iter()
                    .map(|page| {
                        Fragment::new(
                            page.text,
                            FragmentMetadata::page(source_path.clone(), filename.clone()),
                        )
                    })
                    .collect())
            }
            FileKind::WholeFile => {
                let elements = self.whole_file.extract_elements(path).await?;
                Ok(elements
                    .into_iter()
                    .map(|text| Fragment::new(text, FragmentMetadata::whole_file(filename.clone())))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl<W> FragmentLoader for DirectoryLoader<W>
where
    W: WholeFileExtractor,
{
    async fn load(&self) -> Result<Vec<Fragment>, IngestError> {
        let files = discover_files(&self.folder, &self.strategy);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no supported documents found in {}",
                self.folder.display()
            )));
        }

        let mut fragments = Vec::new();
        for (path, kind) in files {
            let loaded = self.load_file(&path, kind).await?;
            if loaded.is_empty() {
                warn!(path = %path.display(), "no text extracted");
            }
            info!(path = %path.display(), fragments = loaded.len(), ?kind, "loaded");
            fragments.extend(loaded);
        }

        Ok(fragments)
    }
}
