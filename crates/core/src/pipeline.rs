use crate::chunking::{ChunkingConfig, RecursiveSplitter};
use crate::cleaner::TextCleaner;
use crate::consolidate::{consolidate, Consolidation};
use crate::dedup::DuplicateGuard;
use crate::embeddings::Embedder;
use crate::error::{IngestError, PipelineError};
use crate::index::SourceIndex;
use crate::llm::ChatModel;
use crate::loader::FragmentLoader;
use crate::models::{
    Chunk, ConsolidatedDocument, Fragment, IngestionOptions, IngestionSummary, SkipSet,
};
use crate::prompt::Prompter;
use crate::reconcile::reconcile;
use tracing::{error, info};

/// One linear ingestion run: load, consolidate, clean, chunk, attribute,
/// deduplicate and upsert. Every step finishes before the next one starts.
pub struct IngestionPipeline<L, M, P, I, E> {
    loader: L,
    cleaner: TextCleaner<M>,
    splitter: RecursiveSplitter,
    prompter: P,
    index: I,
    embedder: E,
    options: IngestionOptions,
}

impl<L, M, P, I, E> IngestionPipeline<L, M, P, I, E>
where
    L: FragmentLoader,
    M: ChatModel,
    P: Prompter,
    I: SourceIndex,
    E: Embedder,
{
    pub fn new(
        loader: L,
        model: M,
        prompter: P,
        index: I,
        embedder: E,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;

        Ok(Self {
            loader,
            cleaner: TextCleaner::new(model, options.max_cleaning_attempts)?,
            splitter: RecursiveSplitter::new(ChunkingConfig::from(&options))?,
            prompter,
            index,
            embedder,
            options,
        })
    }

    /// Runs the whole batch. The specific cause of a failure is only logged;
    /// callers get a single generic error. Batches upserted before the failure
    /// stay in the index.
    pub async fn run(&self) -> Result<IngestionSummary, PipelineError> {
        match self.ingest().await {
            Ok(summary) => {
                info!(
                    fragments = summary.fragments,
                    chunks = summary.chunks,
                    uploaded = summary.uploaded,
                    skipped_sources = summary.skipped_sources.len(),
                    "ingestion complete"
                );
                Ok(summary)
            }
            Err(cause) => {
                error!(error = %cause, "ingestion failed");
                Err(PipelineError::FailedToIngest)
            }
        }
    }

    async fn ingest(&self) -> Result<IngestionSummary, IngestError> {
        let fragments = self.loader.load().await?;
        let fragment_count = fragments.len();

        let mut chunks = self.prepare_chunks(fragments).await;
        reconcile(&mut chunks, &self.prompter).await?;

        info!(chunks = chunks.len(), "creating vector store entries");
        let (uploaded, skipped) = self.commit(&chunks).await?;

        Ok(IngestionSummary {
            fragments: fragment_count,
            chunks: chunks.len(),
            uploaded,
            skipped_sources: skipped.sorted(),
        })
    }

    /// Cleans page-level fragments into one chunk each, then cleans and
    /// chunks every consolidated document. Page chunks come first.
    pub async fn prepare_chunks(&self, fragments: Vec<Fragment>) -> Vec<Chunk> {
        let Consolidation {
            page_oriented,
            consolidated,
        } = consolidate(fragments);

        let mut chunks = Vec::with_capacity(page_oriented.len());
        let page_count = page_oriented.len();
        for (position, fragment) in page_oriented.into_iter().enumerate() {
            info!(page = position + 1, of = page_count, "cleaning up text on page");
            let source = fragment.metadata.source_path.unwrap_or_default();
            let text = self.cleaner.clean(&fragment.text, Some(&source)).await;
            chunks.push(Chunk::new(text, source));
        }

        for document in consolidated {
            chunks.extend(self.clean_document(document).await);
        }

        chunks
    }

    async fn clean_document(&self, document: ConsolidatedDocument) -> Vec<Chunk> {
        let pieces = self.splitter.chunk_document(&document);
        let total = pieces.len();
        let mut cleaned = Vec::with_capacity(total);

        for (position, piece) in pieces.into_iter().enumerate() {
            info!(
                source = document.source(),
                chunk = position + 1,
                of = total,
                "cleaning up text for document"
            );
            let text = self.cleaner.clean(&piece.text, Some(piece.source())).await;
            cleaned.push(Chunk { text, ..piece });
        }

        cleaned
    }

    /// Every guard decision is made before the first upsert, so lookups only
    /// see what was indexed before this run.
    async fn commit(&self, chunks: &[Chunk]) -> Result<(usize, SkipSet), IngestError> {
        let mut guard = DuplicateGuard::new(
            &self.index,
            &self.prompter,
            self.options.duplicate_lookup_limit,
        );
        let mut kept: Vec<&Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if !guard.should_skip(chunk.source()).await? {
                kept.push(chunk);
            }
        }
        let skipped = guard.into_skip_set();

        let mut uploaded = 0usize;
        for batch in upsert_batches(&kept, self.options.upsert_batch_size) {
            uploaded += self.upload(&batch).await?;
        }

        Ok((uploaded, skipped))
    }

    async fn upload(&self, batch: &[Chunk]) -> Result<usize, IngestError> {
        let texts = batch.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        self.index.upsert(batch, &embeddings).await?;

        if let Some(first) = batch.first() {
            info!(source = first.source(), chunks = batch.len(), "upserted");
        }
        Ok(batch.len())
    }
}

/// Consecutive chunks sharing a source, at most `max` per batch.
fn upsert_batches(chunks: &[&Chunk], max: usize) -> Vec<Vec<Chunk>> {
    let mut batches: Vec<Vec<Chunk>> = Vec::new();
    for chunk in chunks {
        match batches.last_mut() {
            Some(batch)
                if batch.len() < max
                    && batch.last().is_some_and(|last| last.source() == chunk.source()) =>
            {
                batch.push((*chunk).clone());
            }
            _ => batches.push(vec![(*chunk).clone()]),
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentMetadata;
    use crate::testing::{
        FixedEmbedder, RecordingIndex, ScriptedModel, ScriptedPrompter, StaticLoader,
    };

    fn page(text: &str) -> Fragment {
        Fragment::new(text, FragmentMetadata::page("docs/doc.pdf", "doc.pdf"))
    }

    fn element(text: &str) -> Fragment {
        Fragment::new(text, FragmentMetadata::whole_file("notes.docx"))
    }

    fn pipeline(
        fragments: Vec<Fragment>,
        model: ScriptedModel,
        prompter: ScriptedPrompter,
        index: RecordingIndex,
    ) -> IngestionPipeline<StaticLoader, ScriptedModel, ScriptedPrompter, RecordingIndex, FixedEmbedder>
    {
        IngestionPipeline::new(
            StaticLoader::new(fragments),
            model,
            prompter,
            index,
            FixedEmbedder,
            IngestionOptions::default(),
        )
        .expect("default options are valid")
    }

    #[tokio::test]
    async fn pages_pass_through_and_whole_file_elements_are_chunked() {
        let fragments = vec![
            page("Page one\ntext"),
            page("Page two"),
            element("Meeting notes. "),
            page("Page three...."),
            element("Action items."),
        ];
        let prompter = ScriptedPrompter::new([
            "https://example.com/doc",
            "y",
            "https://example.com/notes",
            "y",
        ]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter.clone(), index.clone());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.fragments, 5);
        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.uploaded, 4);
        assert!(summary.skipped_sources.is_empty());

        let upserts = index.upserts();
        assert_eq!(upserts.len(), 2);
        assert_eq!(upserts[0].len(), 3);
        assert_eq!(upserts[0][0].text, "Page one text");
        assert_eq!(upserts[0][2].text, "Page three");
        assert!(upserts[0].iter().all(|chunk| chunk.source() == "https://example.com/doc"));
        assert_eq!(upserts[1][0].text, "Meeting notes. Action items.");
        assert_eq!(upserts[1][0].source(), "https://example.com/notes");
        assert!(prompter.prompts()[0].contains("docs/doc.pdf"));
        assert!(prompter.prompts()[2].contains("notes.docx"));
    }

    #[tokio::test]
    async fn long_consolidated_document_yields_splitter_chunk_count() {
        let sentence = "The relief valve must be inspected every month";
        let first = vec![sentence; 30].join(". ");
        let second = vec![sentence; 30].join(". ");
        let fragments = vec![page("cover"), element(&first), element(&second)];

        let splitter = RecursiveSplitter::new(ChunkingConfig::default()).expect("splitter");
        let expected_notes = splitter.split_text(&format!("{first}{second}")).len();
        assert!(expected_notes > 1);

        let prompter = ScriptedPrompter::new(["cover-source", "y", "notes-source", "y"]);
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter, RecordingIndex::default());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.chunks, 1 + expected_notes);
    }

    #[tokio::test]
    async fn already_indexed_source_is_skipped_once_chosen() {
        let fragments = vec![page("one"), page("two"), page("three")];
        let prompter = ScriptedPrompter::new(["https://example.com/a", "y", "y"]);
        let index = RecordingIndex::with_existing(["https://example.com/a"]);
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter.clone(), index.clone());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.skipped_sources, vec!["https://example.com/a"]);
        assert_eq!(index.lookups().len(), 1);
        assert!(index.upserts().is_empty());
        assert_eq!(prompter.prompts().len(), 3);
    }

    #[tokio::test]
    async fn declined_skip_uploads_and_asks_per_chunk() {
        let fragments = vec![page("one"), page("two")];
        let prompter = ScriptedPrompter::new(["https://example.com/a", "y", "n", "n"]);
        let index = RecordingIndex::with_existing(["https://example.com/a"]);
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter, index.clone());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.uploaded, 2);
        assert_eq!(index.lookups().len(), 2);
        assert_eq!(index.upserts().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_model_still_completes_with_pattern_cleaned_text() {
        let fragments = vec![page("a\nb....")];
        let prompter = ScriptedPrompter::new(["src", "y"]);
        let index = RecordingIndex::default();
        let model = ScriptedModel::failing();
        let pipeline = pipeline(fragments, model.clone(), prompter, index.clone());

        pipeline.run().await.expect("cleaning failures are not fatal");

        assert_eq!(model.call_count(), 3);
        assert_eq!(index.upserts()[0][0].text, "a b");
    }

    #[tokio::test]
    async fn unreadable_answer_fails_the_whole_run() {
        let fragments = vec![page("one")];
        let prompter = ScriptedPrompter::new(["https://example.com/a"]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter, index.clone());

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::FailedToIngest)));
        assert!(index.upserts().is_empty());
    }

    #[tokio::test]
    async fn batches_split_when_canonical_source_changes() {
        let fragments = vec![
            Fragment::new("a1", FragmentMetadata::page("a.pdf", "a.pdf")),
            Fragment::new("b1", FragmentMetadata::page("b.pdf", "b.pdf")),
            Fragment::new("a2", FragmentMetadata::page("a.pdf", "a.pdf")),
        ];
        let prompter = ScriptedPrompter::new(["A", "y", "B", "y"]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter, index.clone());

        pipeline.run().await.expect("run succeeds");

        let sizes = index.upserts().iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, vec![1, 1, 1]);
        assert_eq!(index.lookups(), vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn own_upserts_never_trigger_the_duplicate_prompt() {
        let fragments = (1..=150)
            .map(|n| {
                Fragment::new(
                    format!("page {n}"),
                    FragmentMetadata::page("docs/big.pdf", "big.pdf"),
                )
            })
            .collect::<Vec<_>>();
        let prompter = ScriptedPrompter::new(["https://example.com/big", "y"]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter.clone(), index.clone());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.uploaded, 150);
        assert!(summary.skipped_sources.is_empty());
        assert_eq!(prompter.prompts().len(), 2);
        let sizes = index.upserts().iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, vec![100, 50]);
    }

    #[tokio::test]
    async fn sources_reconciled_to_the_same_url_are_all_uploaded() {
        let fragments = vec![
            Fragment::new("a page", FragmentMetadata::page("docs/a.pdf", "a.pdf")),
            Fragment::new("b page", FragmentMetadata::page("docs/b.pdf", "b.pdf")),
            Fragment::new("a notes", FragmentMetadata::whole_file("a.docx")),
        ];
        let prompter = ScriptedPrompter::new(["URL-A", "y", "URL-B", "y", "URL-A", "y"]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter.clone(), index.clone());

        let summary = pipeline.run().await.expect("run succeeds");

        assert_eq!(summary.uploaded, 3);
        assert!(summary.skipped_sources.is_empty());
        assert_eq!(prompter.prompts().len(), 6);
        assert_eq!(index.lookups(), vec!["URL-A", "URL-B", "URL-A"]);
    }

    #[tokio::test]
    async fn consolidated_documents_split_on_paragraph_breaks() {
        let first = vec!["alpha"; 150].join(" ");
        let second = vec!["omega"; 150].join(" ");
        let fragments = vec![element(&format!("{first}\n\n")), element(&second)];
        let prompter = ScriptedPrompter::new(["https://example.com/notes", "y"]);
        let index = RecordingIndex::default();
        let pipeline = pipeline(fragments, ScriptedModel::default(), prompter, index.clone());

        pipeline.run().await.expect("run succeeds");

        let texts = index
            .upserts()
            .concat()
            .into_iter()
            .map(|chunk| chunk.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec![first, second]);
    }
}
