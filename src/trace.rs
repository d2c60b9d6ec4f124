use std::sync::{Arc, Mutex, PoisonError};

use derive_more::{Deref, Display};

#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct ActivityId(uid::Id<ActivityId>);

/// A caller-supplied trace context collecting structured build records.
#[derive(Debug, Default, Clone)]
pub struct Context {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Context {
    /// Snapshot of all records attached so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, record: Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// One traced unit of work within a [`Context`].
#[derive(Debug, Clone)]
pub struct Activity {
    id: ActivityId,
    verb: &'static str,
    ctx: Context,
}

impl Activity {
    pub fn new(ctx: &Context, verb: &'static str) -> Self {
        let id = ActivityId(uid::Id::new());
        let ctx = ctx.clone();
        Self { id, verb, ctx }
    }

    #[inline]
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    #[inline]
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// Attach a structured record to the owning context.
    pub fn add_metadata(&self, meta: Metadata) {
        let record = Record {
            activity: self.id,
            verb: self.verb,
            meta,
        };
        self.ctx.push(record);
    }
}

#[derive(Debug, Clone)]
pub struct Record {
    pub activity: ActivityId,
    pub verb: &'static str,
    pub meta: Metadata,
}

#[derive(Debug, Clone)]
pub enum Metadata {
    Build(BuildInfo),
    Kernel(KernelRecord),
}

/// Per-build diagnostics: target device, full unit source, and on failure the
/// toolchain's status code and log text.
#[derive(Debug, Default, Clone)]
pub struct BuildInfo {
    pub device: String,
    pub src: String,
    pub status: Option<i32>,
    pub log: Option<String>,
}

/// Per-kernel build record.
#[derive(Debug, Clone)]
pub struct KernelRecord {
    pub kname: String,
    pub src: String,
}

#[cfg(test)]
mod tests {
    use super::{Activity, Context, Metadata};

    #[test]
    fn test_records_accumulate() {
        let ctx = Context::default();
        let outer = Activity::new(&ctx, "build");
        let inner = Activity::new(outer.ctx(), "build_kernel");
        assert_ne!(outer.id(), inner.id());

        inner.add_metadata(Metadata::Kernel(super::KernelRecord {
            kname: "k1".into(),
            src: "// src".into(),
        }));
        outer.add_metadata(Metadata::Build(Default::default()));

        let records = ctx.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].verb, "build_kernel");
        assert_eq!(records[1].verb, "build");
    }
}
