#![forbid(unsafe_code)]

//! Shared values: reactive cells addressed by caller-assigned ids.
//!
//! # Design
//!
//! The registry owns every cell. Composite payloads (arrays, objects, worklet
//! starters) refer to their parts by id and resolve them through the registry
//! when read, so no cell ever owns another and replacing a cell's payload is
//! immediately visible to every composite that names it.
//!
//! Construction goes through a factory evaluated on the UI thread. A factory
//! re-resolves every dependency when it runs and answers with a
//! [`Construction`]: either the built payload or the first dependency that was
//! missing. A declined construction leaves the registry untouched; the caller
//! retries once the dependency has been registered.
//!
//! # Invariants
//!
//! 1. Every create or replace stamps the cell with a fresh version from a
//!    registry-wide counter, so versions never repeat.
//! 2. [`SharedValueRegistry::version_stamp`] changes whenever the cell or any
//!    cell it transitively names is replaced.
//! 3. A declined construction has no side effects.
//!
//! # Failure Modes
//!
//! - **Dangling part**: a composite whose part was unregistered later reads
//!   that part as `Undefined`.
//! - **Cycles**: `set` can make composites name each other. A stamp visits
//!   each reachable cell once. A read cuts any part already on the path from
//!   the root, and any part deeper than [`MAX_DEPTH`]; cut parts read as
//!   `Undefined`.
//! - **Shared parts**: a read expands a part each time it is named, so a
//!   read builds at most [`MAX_READ_PARTS`] cells; later parts read as
//!   `Undefined`.

use ahash::{AHashMap, AHashSet};
use wkl_core::{Callable, SharedValueDescriptor, SharedValueId, Value, WorkletId};

use crate::worklet::WorkletRegistry;

/// Deepest composite nesting followed by reads.
pub const MAX_DEPTH: usize = 32;

/// Most cells expanded by one read.
pub const MAX_READ_PARTS: usize = 4096;

/// The dependency that stopped a construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    SharedValue(SharedValueId),
    Worklet(WorkletId),
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedValue(id) => write!(f, "{id}"),
            Self::Worklet(id) => write!(f, "{id}"),
        }
    }
}

/// Result of a construction that may depend on entries not registered yet.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Construction<T> {
    Built(T),
    Declined(Unresolved),
}

impl<T> Construction<T> {
    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }

    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Construction<R> {
        match self {
            Self::Built(value) => Construction::Built(f(value)),
            Self::Declined(missing) => Construction::Declined(missing),
        }
    }

    #[must_use]
    pub fn built(self) -> Option<T> {
        match self {
            Self::Built(value) => Some(value),
            Self::Declined(_) => None,
        }
    }
}

/// What a registration did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    Replaced,
    /// `register_if_absent` found the id taken; the factory did not run.
    AlreadyPresent,
    Declined(Unresolved),
}

/// Payload of a shared value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Double(f64),
    String(String),
    Array(Vec<SharedValueId>),
    Object {
        ids: Vec<SharedValueId>,
        names: Vec<String>,
    },
    Function(WorkletId),
    WorkletStarter {
        worklet: WorkletId,
        args: Vec<SharedValueId>,
    },
}

impl Payload {
    /// Ids of the cells this payload names.
    #[must_use]
    pub fn parts(&self) -> &[SharedValueId] {
        match self {
            Self::Array(ids) | Self::Object { ids, .. } => ids,
            Self::WorkletStarter { args, .. } => args,
            Self::Double(_) | Self::String(_) | Self::Function(_) => &[],
        }
    }

    /// Resolve a descriptor against the current registries.
    ///
    /// Every part and worklet is looked up now; the first missing one
    /// declines the whole construction.
    pub fn build(
        descriptor: &SharedValueDescriptor,
        values: &SharedValueRegistry,
        worklets: &WorkletRegistry,
    ) -> Construction<Self> {
        if let Some(worklet) = descriptor.worklet()
            && !worklets.contains(worklet)
        {
            return Construction::Declined(Unresolved::Worklet(worklet));
        }
        if let Some(missing) = descriptor
            .dependencies()
            .iter()
            .find(|id| !values.contains(**id))
        {
            return Construction::Declined(Unresolved::SharedValue(*missing));
        }

        Construction::Built(match descriptor {
            SharedValueDescriptor::Double(n) => Self::Double(*n),
            SharedValueDescriptor::String(s) => Self::String(s.clone()),
            SharedValueDescriptor::Array(ids) => Self::Array(ids.clone()),
            SharedValueDescriptor::Object { ids, names } => Self::Object {
                ids: ids.clone(),
                names: names.clone(),
            },
            SharedValueDescriptor::Function(worklet) => Self::Function(*worklet),
            SharedValueDescriptor::WorkletStarter { worklet, args } => Self::WorkletStarter {
                worklet: *worklet,
                args: args.clone(),
            },
        })
    }
}

/// One reactive cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedValue {
    id: SharedValueId,
    payload: Payload,
    version: u64,
}

impl SharedValue {
    #[must_use]
    pub fn id(&self) -> SharedValueId {
        self.id
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Swap in a new payload, keeping the id.
    fn adopt(&mut self, payload: Payload, version: u64) {
        self.payload = payload;
        self.version = version;
    }
}

/// Owns every shared value by id. UI-thread only.
#[derive(Debug)]
pub struct SharedValueRegistry {
    values: AHashMap<SharedValueId, SharedValue>,
    next_version: u64,
}

impl Default for SharedValueRegistry {
    fn default() -> Self {
        Self {
            values: AHashMap::new(),
            next_version: 1,
        }
    }
}

impl SharedValueRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    /// Insert a value built by `factory`, unless `id` is already taken.
    pub fn register_if_absent(
        &mut self,
        id: SharedValueId,
        factory: impl FnOnce(&Self) -> Construction<Payload>,
    ) -> RegisterOutcome {
        if self.values.contains_key(&id) {
            tracing::debug!(%id, "shared value already registered");
            return RegisterOutcome::AlreadyPresent;
        }
        self.insert_built(id, factory)
    }

    /// Replace the payload of `id` with a freshly built one, or insert it if
    /// absent.
    pub fn set_or_create(
        &mut self,
        id: SharedValueId,
        factory: impl FnOnce(&Self) -> Construction<Payload>,
    ) -> RegisterOutcome {
        if !self.values.contains_key(&id) {
            return self.insert_built(id, factory);
        }
        match factory(self) {
            Construction::Built(payload) => {
                let version = self.bump_version();
                if let Some(cell) = self.values.get_mut(&id) {
                    cell.adopt(payload, version);
                }
                tracing::debug!(%id, version, "shared value replaced");
                RegisterOutcome::Replaced
            }
            Construction::Declined(missing) => {
                tracing::debug!(%id, %missing, "shared value update declined");
                RegisterOutcome::Declined(missing)
            }
        }
    }

    fn insert_built(
        &mut self,
        id: SharedValueId,
        factory: impl FnOnce(&Self) -> Construction<Payload>,
    ) -> RegisterOutcome {
        match factory(self) {
            Construction::Built(payload) => {
                let version = self.bump_version();
                self.values.insert(
                    id,
                    SharedValue {
                        id,
                        payload,
                        version,
                    },
                );
                tracing::debug!(%id, version, "shared value registered");
                RegisterOutcome::Inserted
            }
            Construction::Declined(missing) => {
                tracing::debug!(%id, %missing, "shared value construction declined");
                RegisterOutcome::Declined(missing)
            }
        }
    }

    /// Remove a value. Returns whether it existed.
    pub fn unregister(&mut self, id: SharedValueId) -> bool {
        let removed = self.values.remove(&id).is_some();
        tracing::debug!(%id, removed, "shared value unregistered");
        removed
    }

    #[must_use]
    pub fn get(&self, id: SharedValueId) -> Option<&SharedValue> {
        self.values.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: SharedValueId) -> bool {
        self.values.contains_key(&id)
    }

    /// Live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<SharedValueId> {
        let mut ids: Vec<_> = self.values.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Highest version found in `id` and every cell it transitively names.
    ///
    /// `None` if `id` itself is absent. Each reachable cell is visited once.
    #[must_use]
    pub fn version_stamp(&self, id: SharedValueId) -> Option<u64> {
        let mut stamp = self.values.get(&id)?.version;
        let mut seen = AHashSet::new();
        seen.insert(id);
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(cell) = self.values.get(&next) else {
                continue;
            };
            stamp = stamp.max(cell.version);
            for part in cell.payload.parts() {
                if seen.insert(*part) {
                    pending.push(*part);
                }
            }
        }
        Some(stamp)
    }

    /// Current value of `id` as a boundary value. `None` if absent.
    #[must_use]
    pub fn value_of(&self, id: SharedValueId, worklets: &WorkletRegistry) -> Option<Value> {
        self.values
            .contains_key(&id)
            .then(|| self.part_value(id, worklets, &mut ReadWalk::default()))
    }

    fn part_value(
        &self,
        id: SharedValueId,
        worklets: &WorkletRegistry,
        walk: &mut ReadWalk,
    ) -> Value {
        let cut = walk.path.len() >= MAX_DEPTH
            || walk.path.contains(&id)
            || walk.expanded >= MAX_READ_PARTS;
        if cut {
            return Value::Undefined;
        }
        let Some(cell) = self.values.get(&id) else {
            return Value::Undefined;
        };
        walk.expanded += 1;
        walk.path.push(id);
        let value = self.payload_value(&cell.payload, worklets, walk);
        walk.path.pop();
        value
    }

    fn parts_value(
        &self,
        ids: &[SharedValueId],
        worklets: &WorkletRegistry,
        walk: &mut ReadWalk,
    ) -> Vec<Value> {
        ids.iter()
            .map(|id| self.part_value(*id, worklets, walk))
            .collect()
    }

    fn payload_value(
        &self,
        payload: &Payload,
        worklets: &WorkletRegistry,
        walk: &mut ReadWalk,
    ) -> Value {
        match payload {
            Payload::Double(n) => Value::Number(*n),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Array(ids) => Value::Array(self.parts_value(ids, worklets, walk)),
            Payload::Object { ids, names } => Value::Object(
                names
                    .iter()
                    .cloned()
                    .zip(self.parts_value(ids, worklets, walk))
                    .collect(),
            ),
            Payload::Function(worklet) => worklets
                .get(*worklet)
                .map_or(Value::Undefined, |w| Value::Function(w.body().clone())),
            Payload::WorkletStarter { worklet, args } => {
                let Some(worklet) = worklets.get(*worklet) else {
                    return Value::Undefined;
                };
                let body = worklet.body().clone();
                let captured = self.parts_value(args, worklets, walk);
                Value::Function(Callable::new(move |_| body.call(&captured)))
            }
        }
    }

    /// Call a worklet starter with the live values of its arguments.
    ///
    /// `None` if `id` is absent, is not a starter, or its worklet is gone.
    pub fn start_worklet(&self, id: SharedValueId, worklets: &WorkletRegistry) -> Option<Value> {
        let Payload::WorkletStarter { worklet, args } = &self.values.get(&id)?.payload else {
            return None;
        };
        let worklet = worklets.get(*worklet)?;
        let mut walk = ReadWalk {
            path: vec![id],
            expanded: 1,
        };
        let args = self.parts_value(args, worklets, &mut walk);
        Some(worklet.call(&args))
    }
}

/// State of one read: the ids from the root down to the current part, and
/// how many cells have been expanded so far.
#[derive(Debug, Default)]
struct ReadWalk {
    path: Vec<SharedValueId>,
    expanded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(raw: u32) -> SharedValueId {
        SharedValueId::new(raw)
    }

    fn double(n: f64) -> SharedValueDescriptor {
        SharedValueDescriptor::Double(n)
    }

    fn build<'a>(
        descriptor: &'a SharedValueDescriptor,
        worklets: &'a WorkletRegistry,
    ) -> impl FnOnce(&SharedValueRegistry) -> Construction<Payload> + 'a {
        move |values: &SharedValueRegistry| Payload::build(descriptor, values, worklets)
    }

    #[test]
    fn register_does_not_overwrite() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        assert_eq!(
            values.register_if_absent(sv(1), build(&double(1.0), &worklets)),
            RegisterOutcome::Inserted
        );
        assert_eq!(
            values.register_if_absent(sv(1), build(&double(2.0), &worklets)),
            RegisterOutcome::AlreadyPresent
        );
        assert_eq!(values.value_of(sv(1), &worklets), Some(Value::Number(1.0)));
    }

    #[test]
    fn register_if_absent_skips_factory_when_present() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(1.0), &worklets));
        let outcome = values.register_if_absent(sv(1), |_| panic!("factory must not run"));
        assert_eq!(outcome, RegisterOutcome::AlreadyPresent);
    }

    #[test]
    fn set_creates_when_absent_and_replaces_when_present() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        assert_eq!(
            values.set_or_create(sv(4), build(&double(3.0), &worklets)),
            RegisterOutcome::Inserted
        );
        let first_version = values.get(sv(4)).unwrap().version();

        assert_eq!(
            values.set_or_create(
                sv(4),
                build(&SharedValueDescriptor::String("hi".into()), &worklets)
            ),
            RegisterOutcome::Replaced
        );
        let cell = values.get(sv(4)).unwrap();
        assert_eq!(cell.id(), sv(4));
        assert_eq!(cell.payload(), &Payload::String("hi".into()));
        assert!(cell.version() > first_version);
    }

    #[test]
    fn composite_with_missing_part_is_declined_without_side_effects() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let object = SharedValueDescriptor::Object {
            ids: vec![sv(1)],
            names: vec!["x".into()],
        };

        assert_eq!(
            values.register_if_absent(sv(2), build(&object, &worklets)),
            RegisterOutcome::Declined(Unresolved::SharedValue(sv(1)))
        );
        assert!(values.get(sv(2)).is_none());
        assert!(values.is_empty());

        let _ = values.register_if_absent(sv(1), build(&double(7.0), &worklets));
        assert_eq!(
            values.register_if_absent(sv(2), build(&object, &worklets)),
            RegisterOutcome::Inserted
        );
        assert_eq!(
            values.value_of(sv(2), &worklets),
            Some(Value::object([("x", Value::Number(7.0))]))
        );
    }

    #[test]
    fn declined_set_keeps_previous_payload() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(1.0), &worklets));
        let before = values.get(sv(1)).unwrap().clone();

        let array = SharedValueDescriptor::Array(vec![sv(9)]);
        assert_eq!(
            values.set_or_create(sv(1), build(&array, &worklets)),
            RegisterOutcome::Declined(Unresolved::SharedValue(sv(9)))
        );
        assert_eq!(values.get(sv(1)), Some(&before));
    }

    #[test]
    fn function_needs_its_worklet() {
        let mut worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let function = SharedValueDescriptor::Function(WorkletId::new(3));

        assert_eq!(
            values.register_if_absent(sv(5), build(&function, &worklets)),
            RegisterOutcome::Declined(Unresolved::Worklet(WorkletId::new(3)))
        );

        worklets.register(WorkletId::new(3), Callable::new(|_| Value::from(1.0)), 0);
        assert_eq!(
            values.register_if_absent(sv(5), build(&function, &worklets)),
            RegisterOutcome::Inserted
        );
        let value = values.value_of(sv(5), &worklets).unwrap();
        assert_eq!(value.as_callable().unwrap().call(&[]), Value::Number(1.0));
    }

    #[test]
    fn replacing_a_part_is_visible_through_the_composite() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(1.0), &worklets));
        let _ = values.register_if_absent(sv(2), build(&double(2.0), &worklets));
        let array = SharedValueDescriptor::Array(vec![sv(1), sv(2)]);
        let _ = values.register_if_absent(sv(3), build(&array, &worklets));
        let stamp = values.version_stamp(sv(3)).unwrap();

        let _ = values.set_or_create(sv(2), build(&double(20.0), &worklets));

        assert_eq!(
            values.value_of(sv(3), &worklets),
            Some(Value::Array(vec![Value::Number(1.0), Value::Number(20.0)]))
        );
        assert!(values.version_stamp(sv(3)).unwrap() > stamp);
    }

    #[test]
    fn unregistered_part_reads_as_undefined() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(1.0), &worklets));
        let array = SharedValueDescriptor::Array(vec![sv(1)]);
        let _ = values.register_if_absent(sv(2), build(&array, &worklets));

        assert!(values.unregister(sv(1)));
        assert!(values.get(sv(1)).is_none());
        assert_eq!(
            values.value_of(sv(2), &worklets),
            Some(Value::Array(vec![Value::Undefined]))
        );
    }

    #[test]
    fn cyclic_composites_terminate() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(0.0), &worklets));
        let _ = values.register_if_absent(
            sv(2),
            build(&SharedValueDescriptor::Array(vec![sv(1)]), &worklets),
        );
        // Point 1 back at 2.
        let _ = values.set_or_create(
            sv(1),
            build(&SharedValueDescriptor::Array(vec![sv(2)]), &worklets),
        );

        assert!(values.value_of(sv(2), &worklets).is_some());
        assert!(values.version_stamp(sv(2)).is_some());
    }

    #[test]
    fn doubly_named_cycle_reads_and_stamps_quickly() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(1), build(&double(0.0), &worklets));
        let _ = values.register_if_absent(
            sv(2),
            build(&SharedValueDescriptor::Array(vec![sv(1), sv(1)]), &worklets),
        );
        let _ = values.set_or_create(
            sv(1),
            build(&SharedValueDescriptor::Array(vec![sv(2), sv(2)]), &worklets),
        );

        let started = std::time::Instant::now();
        let stamp = values.version_stamp(sv(2)).unwrap();
        assert_eq!(stamp, values.get(sv(1)).unwrap().version());
        // 2 -> 1 -> (2 on the path, cut)
        let cut = Value::Array(vec![Value::Undefined, Value::Undefined]);
        assert_eq!(
            values.value_of(sv(2), &worklets),
            Some(Value::Array(vec![cut.clone(), cut]))
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn deep_diamond_chain_is_bounded() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(0), build(&double(1.0), &worklets));
        for k in 1..=64 {
            let pair = SharedValueDescriptor::Array(vec![sv(k - 1), sv(k - 1)]);
            assert_eq!(
                values.register_if_absent(sv(k), build(&pair, &worklets)),
                RegisterOutcome::Inserted
            );
        }

        let started = std::time::Instant::now();
        let stamp = values.version_stamp(sv(64)).unwrap();
        assert_eq!(stamp, values.get(sv(64)).unwrap().version());
        assert!(values.value_of(sv(64), &worklets).is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        // The bottom of the chain is reachable by stamps at any depth.
        let _ = values.set_or_create(sv(0), build(&double(2.0), &worklets));
        assert!(values.version_stamp(sv(64)).unwrap() > stamp);
    }

    #[test]
    fn read_expands_a_bounded_number_of_cells() {
        let worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        let _ = values.register_if_absent(sv(0), build(&double(1.0), &worklets));
        for k in 1..=20 {
            let pair = SharedValueDescriptor::Array(vec![sv(k - 1), sv(k - 1)]);
            let _ = values.register_if_absent(sv(k), build(&pair, &worklets));
        }

        fn numbers(value: &Value) -> usize {
            match value {
                Value::Number(_) => 1,
                Value::Array(items) => items.iter().map(numbers).sum(),
                _ => 0,
            }
        }
        let read = values.value_of(sv(20), &worklets).unwrap();
        let leaves = numbers(&read);
        assert!(leaves > 0);
        assert!(leaves < MAX_READ_PARTS);

        // Small composites with shared parts read in full.
        let read = values.value_of(sv(3), &worklets).unwrap();
        assert_eq!(numbers(&read), 8);
    }

    #[test]
    fn worklet_starter_uses_live_arguments() {
        let mut worklets = WorkletRegistry::new();
        let mut values = SharedValueRegistry::new();
        worklets.register(
            WorkletId::new(1),
            Callable::new(|args| {
                let sum: f64 = args.iter().filter_map(Value::as_number).sum();
                Value::Number(sum)
            }),
            2,
        );
        let _ = values.register_if_absent(sv(1), build(&double(1.0), &worklets));
        let _ = values.register_if_absent(sv(2), build(&double(2.0), &worklets));
        let starter = SharedValueDescriptor::WorkletStarter {
            worklet: WorkletId::new(1),
            args: vec![sv(1), sv(2)],
        };
        let _ = values.register_if_absent(sv(3), build(&starter, &worklets));

        assert_eq!(values.start_worklet(sv(3), &worklets), Some(Value::Number(3.0)));
        let _ = values.set_or_create(sv(2), build(&double(10.0), &worklets));
        assert_eq!(values.start_worklet(sv(3), &worklets), Some(Value::Number(11.0)));

        // Not a starter.
        assert_eq!(values.start_worklet(sv(1), &worklets), None);
        // Worklet gone.
        worklets.unregister(WorkletId::new(1));
        assert_eq!(values.start_worklet(sv(3), &worklets), None);
    }
}
