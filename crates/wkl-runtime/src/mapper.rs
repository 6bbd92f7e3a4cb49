#![forbid(unsafe_code)]

//! Mappers: appliers gated on input change.
//!
//! A mapper remembers the version stamp of each input as of its last run.
//! Evaluation compares the current stamps to the remembered ones and only
//! calls the worklet when at least one differs. A fresh mapper has nothing
//! remembered and always runs once.
//!
//! A mapper whose worklet returns `true` finishes like an applier: it is
//! removed after the pass and the worklet's listener fires.

use wkl_core::{ApplierId, MapperId, SharedValueId};

use crate::applier::{Applier, Frame, Invocation, SkipReason};
use crate::shared_value::SharedValueRegistry;
use crate::worklet::WorkletRegistry;

#[derive(Debug, Clone)]
pub struct Mapper {
    id: MapperId,
    applier: Applier,
    observed: Option<Vec<u64>>,
}

impl Mapper {
    #[must_use]
    pub fn new(id: MapperId, applier: Applier) -> Self {
        Self {
            id,
            applier,
            observed: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> MapperId {
        self.id
    }

    #[must_use]
    pub fn applier(&self) -> &Applier {
        &self.applier
    }

    /// Stamps seen on the last run, `None` before the first.
    #[must_use]
    pub fn observed(&self) -> Option<&[u64]> {
        self.observed.as_deref()
    }

    /// Forget the remembered stamps so the next evaluation runs.
    pub fn invalidate(&mut self) {
        self.observed = None;
    }

    pub fn evaluate(
        &mut self,
        frame: &Frame,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Invocation {
        let stamps = match current_stamps(self.applier.inputs(), values) {
            Ok(stamps) => stamps,
            Err(missing) => return Invocation::Skipped(SkipReason::MissingInput(missing)),
        };
        if self.observed.as_ref() == Some(&stamps) {
            return Invocation::Unchanged;
        }
        let invocation = self.applier.invoke(frame, values, worklets);
        if !matches!(invocation, Invocation::Skipped(_)) {
            self.observed = Some(stamps);
        }
        invocation
    }
}

fn current_stamps(
    inputs: &[SharedValueId],
    values: &SharedValueRegistry,
) -> Result<Vec<u64>, SharedValueId> {
    inputs
        .iter()
        .map(|input| values.version_stamp(*input).ok_or(*input))
        .collect()
}

/// Mappers in insertion order.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    mappers: Vec<Mapper>,
}

impl MapperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapper. One with the same id is replaced in its slot and starts
    /// with nothing remembered.
    pub fn add_mapper(&mut self, mapper: Mapper) {
        let id = mapper.id;
        match self.mappers.iter_mut().find(|m| m.id == id) {
            Some(slot) => {
                *slot = mapper;
                tracing::debug!(%id, "mapper replaced");
            }
            None => {
                self.mappers.push(mapper);
                tracing::debug!(%id, "mapper added");
            }
        }
    }

    pub fn remove_mapper(&mut self, id: MapperId) -> bool {
        let before = self.mappers.len();
        self.mappers.retain(|m| m.id != id);
        let removed = self.mappers.len() != before;
        tracing::debug!(%id, removed, "mapper removed");
        removed
    }

    /// Evaluate every mapper once, in insertion order, then drop the ones
    /// that finished.
    pub fn evaluate(
        &mut self,
        frame: &Frame,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Vec<(MapperId, Invocation)> {
        let outcomes: Vec<(MapperId, Invocation)> = self
            .mappers
            .iter_mut()
            .map(|mapper| {
                let invocation = mapper.evaluate(frame, values, worklets);
                if let Invocation::Skipped(reason) = &invocation {
                    tracing::trace!(id = %mapper.id, ?reason, "mapper skipped");
                }
                (mapper.id, invocation)
            })
            .collect();

        let finished: Vec<MapperId> = outcomes
            .iter()
            .filter(|(_, invocation)| matches!(invocation, Invocation::Finished(_)))
            .map(|(id, _)| *id)
            .collect();
        if !finished.is_empty() {
            let (done, live): (Vec<Mapper>, Vec<Mapper>) = std::mem::take(&mut self.mappers)
                .into_iter()
                .partition(|m| finished.contains(&m.id));
            self.mappers = live;
            for mapper in done {
                let worklet = mapper.applier.worklet();
                tracing::debug!(id = %mapper.id, %worklet, "mapper finished");
                if let Some(worklet) = worklets.get(worklet) {
                    worklet.notify_listener();
                }
            }
        }
        outcomes
    }

    #[must_use]
    pub fn get(&self, id: MapperId) -> Option<&Mapper> {
        self.mappers.iter().find(|m| m.id == id)
    }

    /// Ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<MapperId> {
        self.mappers.iter().map(Mapper::id).collect()
    }

    /// The applier ids wrapped by live mappers.
    #[must_use]
    pub fn applier_ids(&self) -> Vec<ApplierId> {
        self.mappers.iter().map(|m| m.applier.id()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}
