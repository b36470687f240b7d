//! Tracing decorators for the VCS collaborator.
//!
//! Every registered VCS is wrapped in [`TracedVcs`], which in turn wraps every
//! repository it yields in [`TracedRepository`]. Each call then runs inside
//! a span naming the VCS and repository, so subprocess logs nest under the
//! operation that caused them.

use std::{path::Path, sync::Arc};

use tracing::Instrument;

use super::{Repository, VersionControlSystem};
use crate::Result;

pub struct TracedVcs {
    inner: Arc<dyn VersionControlSystem>,
}

impl TracedVcs {
    pub fn new(inner: Arc<dyn VersionControlSystem>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl VersionControlSystem for TracedVcs {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn work_unit_kind(&self) -> &str {
        self.inner.work_unit_kind()
    }

    async fn resolve_repository(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        let span = tracing::debug_span!("resolve_repository", vcs = self.name(), directory = %dir.display());
        let repo = self.inner.resolve_repository(dir).instrument(span).await?;
        Ok(repo.map(|repo| Arc::new(TracedRepository::new(repo)) as Arc<dyn Repository>))
    }
}

pub struct TracedRepository {
    inner: Arc<dyn Repository>,
}

impl TracedRepository {
    pub fn new(inner: Arc<dyn Repository>) -> Self {
        Self { inner }
    }

    fn span(&self, op: &'static str) -> tracing::Span {
        let vcs = self.inner.vcs();
        tracing::debug_span!("repository", op, vcs = vcs.name(), repo = self.inner.name())
    }
}

#[async_trait::async_trait]
impl Repository for TracedRepository {
    fn vcs(&self) -> Arc<dyn VersionControlSystem> {
        Arc::new(TracedVcs::new(self.inner.vcs()))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn root_dir(&self) -> &Path {
        self.inner.root_dir()
    }

    async fn current(&self) -> Result<String> {
        self.inner.current().instrument(self.span("current")).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).instrument(self.span("list")).await
    }

    async fn sort(&self, work_units: &mut [String]) -> Result<()> {
        let span = self.span("sort");
        self.inner.sort(work_units).instrument(span).await
    }

    async fn create_from_trunk(&self, name: &str) -> Result<()> {
        self.inner
            .create_from_trunk(name)
            .instrument(self.span("create_from_trunk"))
            .await
    }

    async fn create_from_current(&self, name: &str) -> Result<()> {
        self.inner
            .create_from_current(name)
            .instrument(self.span("create_from_current"))
            .await
    }

    async fn rename(&self, name: &str) -> Result<()> {
        self.inner.rename(name).instrument(self.span("rename")).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).instrument(self.span("exists")).await
    }

    async fn switch_to(&self, name: &str) -> Result<()> {
        self.inner.switch_to(name).instrument(self.span("switch_to")).await
    }
}
