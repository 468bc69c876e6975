use chrono::Utc;
use clap::{Parser, Subcommand};
use docprep_core::{
    is_source_indexed, AzureChatModel, AzureEmbedder, AzureOpenAiConfig, DirectoryLoader,
    Embedder, HashingEmbedder, IngestionOptions, IngestionPipeline, QdrantStore,
    TerminalPrompter, UnstructuredClient, DEFAULT_AZURE_DIMENSIONS, DEFAULT_HASHING_DIMENSIONS,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docprep", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "documents")]
    qdrant_collection: String,

    /// Azure OpenAI API key
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    azure_api_key: Option<String>,

    /// Azure OpenAI resource (instance) name
    #[arg(long, env = "AZURE_OPENAI_API_INSTANCE_NAME")]
    azure_instance: Option<String>,

    /// Chat deployment used for proofreading
    #[arg(long, env = "AZURE_OPENAI_API_DEPLOYMENT_NAME_GPT35")]
    azure_chat_deployment: Option<String>,

    /// Embeddings deployment
    #[arg(long, env = "AZURE_OPENAI_API_EMBEDDINGS_DEPLOYMENT_NAME")]
    azure_embeddings_deployment: Option<String>,

    /// Azure OpenAI API version
    #[arg(long, env = "AZURE_OPENAI_API_VERSION")]
    azure_api_version: Option<String>,

    /// Embed with the offline hashing embedder instead of Azure.
    #[arg(long, default_value_t = false)]
    offline_embeddings: bool,

    /// Vector size of the collection; defaults to the embedder's size.
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate, proofread, chunk and upload every document in a folder.
    Ingest {
        /// Folder that contains the documents, searched recursively.
        #[arg(long, default_value = "docs")]
        folder: String,
        /// Unstructured API base URL used for slide decks and word files.
        #[arg(long, env = "UNSTRUCTURED_API_URL", default_value = "http://localhost:8000")]
        unstructured_url: String,
        /// Unstructured API key
        #[arg(long, env = "UNSTRUCTURED_API_KEY", hide_env_values = true)]
        unstructured_api_key: Option<String>,
        /// Target chunk size in characters.
        #[arg(long, default_value = "1350")]
        chunk_size: usize,
        /// Characters shared by consecutive chunks.
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
        /// Maximum chunks per upsert request.
        #[arg(long, default_value = "100")]
        upsert_batch_size: usize,
    },
    /// Report whether a canonical source is already in the index.
    CheckSource {
        /// Canonical source, e.g. the document URL.
        #[arg(long)]
        source: String,
    },
}

impl Cli {
    fn azure_config(&self) -> anyhow::Result<AzureOpenAiConfig> {
        fn required(value: &Option<String>, name: &str) -> anyhow::Result<String> {
            value
                .clone()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing {name}"))
        }

        Ok(AzureOpenAiConfig {
            api_key: required(&self.azure_api_key, "AZURE_OPENAI_API_KEY")?,
            instance_name: required(&self.azure_instance, "AZURE_OPENAI_API_INSTANCE_NAME")?,
            chat_deployment: required(
                &self.azure_chat_deployment,
                "AZURE_OPENAI_API_DEPLOYMENT_NAME_GPT35",
            )?,
            embeddings_deployment: self.azure_embeddings_deployment.clone(),
            api_version: required(&self.azure_api_version, "AZURE_OPENAI_API_VERSION")?,
        })
    }

    fn embedder(&self, config: &AzureOpenAiConfig) -> anyhow::Result<Box<dyn Embedder>> {
        if self.offline_embeddings {
            let dimensions = self.embedding_dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS);
            return Ok(Box::new(HashingEmbedder::new(dimensions)));
        }

        let dimensions = self.embedding_dimensions.unwrap_or(DEFAULT_AZURE_DIMENSIONS);
        let embedder = AzureEmbedder::new(config, dimensions)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        Ok(Box::new(embedder))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docprep boot"
    );

    match &cli.command {
        Command::Ingest {
            folder,
            unstructured_url,
            unstructured_api_key,
            chunk_size,
            chunk_overlap,
            upsert_batch_size,
        } => {
            let config = cli.azure_config()?;
            let model =
                AzureChatModel::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let embedder = cli.embedder(&config)?;

            let store = QdrantStore::new(
                &cli.qdrant_url,
                &cli.qdrant_collection,
                embedder.dimensions(),
            );
            store
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let loader = DirectoryLoader::new(
                folder,
                UnstructuredClient::new(unstructured_url, unstructured_api_key.clone()),
            );
            let options = IngestionOptions {
                chunk_size: *chunk_size,
                chunk_overlap: *chunk_overlap,
                upsert_batch_size: *upsert_batch_size,
                ..IngestionOptions::default()
            };

            let pipeline = IngestionPipeline::new(
                loader,
                model,
                TerminalPrompter::new(),
                store,
                embedder,
                options,
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let summary = pipeline.run().await?;
            info!(
                folder = %folder,
                chunks = summary.chunks,
                uploaded = summary.uploaded,
                skipped = ?summary.skipped_sources,
                "ingestion summary"
            );
            println!("ingestion complete");
        }
        Command::CheckSource { source } => {
            let dimensions = cli.embedding_dimensions.unwrap_or(DEFAULT_AZURE_DIMENSIONS);
            let store = QdrantStore::new(&cli.qdrant_url, &cli.qdrant_collection, dimensions);
            let limit = IngestionOptions::default().duplicate_lookup_limit;

            let indexed = is_source_indexed(&store, source, limit)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if indexed {
                println!("{source} is already in the index");
            } else {
                println!("{source} is not in the index");
            }
        }
    }

    Ok(())
}
