use crate::error::IngestError;
use crate::index::{is_source_indexed, SourceIndex};
use crate::models::SkipSet;
use crate::prompt::{is_skip, Prompter};
use tracing::info;

/// Decides, per chunk, whether its canonical source should be left out of the
/// upload because the index already holds it.
///
/// Sources the operator agreed to skip are remembered for the run and never
/// looked up again. A "no" is not remembered, so every later chunk of that
/// source is looked up and asked about again.
pub struct DuplicateGuard<'a, I: ?Sized, P: ?Sized> {
    index: &'a I,
    prompter: &'a P,
    lookup_limit: usize,
    skip_set: SkipSet,
}

impl<'a, I, P> DuplicateGuard<'a, I, P>
where
    I: SourceIndex + ?Sized,
    P: Prompter + ?Sized,
{
    pub fn new(index: &'a I, prompter: &'a P, lookup_limit: usize) -> Self {
        Self {
            index,
            prompter,
            lookup_limit,
            skip_set: SkipSet::default(),
        }
    }

    pub async fn should_skip(&mut self, source: &str) -> Result<bool, IngestError> {
        if self.skip_set.contains(source) {
            return Ok(true);
        }

        if !is_source_indexed(self.index, source, self.lookup_limit).await? {
            return Ok(false);
        }

        let answer = self
            .prompter
            .ask(&format!(
                "{source} is already uploaded, do you want to skip this document? Y/N "
            ))
            .await?;

        if is_skip(&answer) {
            self.skip_set.insert(source);
            info!(source, "document skipped");
            return Ok(true);
        }

        Ok(false)
    }

    pub fn skip_set(&self) -> &SkipSet {
        &self.skip_set
    }

    pub fn into_skip_set(self) -> SkipSet {
        self.skip_set
    }
}
