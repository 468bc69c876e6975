use crate::error::PromptError;
use crate::models::{Chunk, SourceMap};
use crate::prompt::{is_confirmation, Prompter};
use tracing::info;

/// Asks until the operator confirms an origin for `raw_source`.
pub async fn ask_canonical_source<P>(raw_source: &str, prompter: &P) -> Result<String, PromptError>
where
    P: Prompter + ?Sized,
{
    loop {
        let link = prompter
            .ask(&format!("Where is this document from? \n {raw_source}"))
            .await?;
        let confirmation = prompter.ask("Are you sure? Y/N ").await?;

        if is_confirmation(&confirmation) {
            return Ok(link);
        }
    }
}

/// Replaces every chunk's raw source with its confirmed canonical origin,
/// asking once per distinct raw source in first-encounter order.
pub async fn reconcile<P>(chunks: &mut [Chunk], prompter: &P) -> Result<(), PromptError>
where
    P: Prompter + ?Sized,
{
    let groups = SourceMap::build(chunks).into_groups();
    info!(distinct_sources = groups.len(), chunks = chunks.len(), "reconciling sources");

    for (raw_source, indices) in groups {
        let canonical = ask_canonical_source(&raw_source, prompter).await?;
        info!(raw = %raw_source, canonical = %canonical, chunks = indices.len(), "source confirmed");

        for index in indices {
            chunks[index].metadata.source = canonical.clone();
        }
    }

    Ok(())
}
