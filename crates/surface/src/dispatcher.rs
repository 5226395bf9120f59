//! Surface-side consumer of the call queue.
//!
//! The dispatcher owns the live backend. It applies call records in order,
//! at most once per backend instance, and rebuilds the instance from a
//! snapshot on demand. Every record and every snapshot entry runs inside its
//! own failure boundary: a failure is logged, counted and reported, and the
//! rest of the batch still runs.

use std::collections::HashSet;

use foundation::SequenceId;
use runtime::{CallRecord, Continuity, EventRecord, Metrics, Props, continuity};
use scene::{ControlDef, ControlKey, ControlKind, ControlPosition, LayerDef, MapSnapshot, SourceDef};
use serde::de::DeserializeOwned;
use serde_json::Value;
use streaming::{Method, replayable_setters};
use tracing::{debug, info, warn};

use crate::backend::{Backend, PropertyTarget, Readiness};
use crate::error::ApplyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    /// Record id; `None` for entries that came from a snapshot.
    pub id: Option<SequenceId>,
    pub target: String,
    pub error: ApplyError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
    pub buffered: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.buffered += other.buffered;
        self.failures.extend(other.failures);
    }

    fn absorb(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Duplicate => self.skipped += 1,
            ApplyOutcome::Buffered => self.buffered += 1,
            ApplyOutcome::Failed(failure) => self.failures.push(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already applied to this instance.
    Duplicate,
    /// Held until the backend is ready.
    Buffered,
    Failed(ApplyFailure),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Uncreated,
    /// Created, waiting for the ready signal.
    Pending,
    Ready,
}

#[derive(Debug)]
pub struct Dispatcher<B> {
    backend: B,
    state: InstanceState,
    last_applied: Option<SequenceId>,
    buffered: Vec<CallRecord>,
    pending_rebuild: Option<(MapSnapshot, Vec<CallRecord>)>,
    metrics: Metrics,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: InstanceState::Uncreated,
            last_applied: None,
            buffered: Vec::new(),
            pending_rebuild: None,
            metrics: Metrics::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InstanceState::Ready
    }

    pub fn last_applied(&self) -> Option<SequenceId> {
        self.last_applied
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Treats every record up to `through` as applied. Used after a rebuild
    /// whose snapshot already covers those records.
    pub fn resume_after(&mut self, through: SequenceId) {
        if self.last_applied.is_none_or(|last| through > last) {
            self.last_applied = Some(through);
        }
    }

    /// Applies one record. Records that are not newer than the last applied
    /// one are skipped; before the backend is ready they are buffered.
    pub fn apply(&mut self, record: &CallRecord) -> ApplyOutcome {
        if self.state != InstanceState::Ready {
            debug!("buffering call {} ({}) until ready", record.id, record.method);
            self.buffered.push(record.clone());
            self.metrics.inc("calls.buffered");
            return ApplyOutcome::Buffered;
        }
        match continuity(self.last_applied, record.id) {
            Continuity::Duplicate => {
                debug!("skipping already applied call {}", record.id);
                self.metrics.inc("calls.skipped");
                return ApplyOutcome::Duplicate;
            }
            Continuity::Gap { expected, found } => {
                warn!("call sequence gap: expected {expected}, got {found}");
                self.metrics.inc("calls.gaps");
            }
            Continuity::Next => {}
        }
        self.last_applied = Some(record.id);

        let result = self.apply_record(record);
        match self.settle(Some(record.id), &record_target(record), result) {
            Some(failure) => ApplyOutcome::Failed(failure),
            None => ApplyOutcome::Applied,
        }
    }

    pub fn apply_batch(&mut self, records: &[CallRecord]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for record in records {
            report.absorb(self.apply(record));
        }
        report
    }

    /// Re-creates the backend from `snapshot`, then replays the still
    /// relevant property setters among `records`.
    ///
    /// Records buffered before this call are dropped: the snapshot
    /// supersedes them. When the new instance is not ready yet the whole
    /// rebuild waits for [`Dispatcher::notify_ready`].
    pub fn replay_all(&mut self, snapshot: &MapSnapshot, records: &[CallRecord]) -> ApplyReport {
        let mut report = ApplyReport::default();
        if !self.buffered.is_empty() {
            debug!("dropping {} buffered calls superseded by snapshot", self.buffered.len());
            self.buffered.clear();
        }
        self.last_applied = None;
        self.pending_rebuild = None;
        self.metrics.inc("surface.rebuilds");

        for (layer, source) in snapshot.dangling_references() {
            warn!("layer {layer} refers to missing source {source}");
        }
        if snapshot.missing_token() {
            warn!(
                "{} needs an access token and none is set; rendering will be degraded",
                snapshot.backend
            );
        }

        match self
            .backend
            .create_instance(&snapshot.viewport, &snapshot.scalars)
        {
            Ok(Readiness::Ready) => {
                self.state = InstanceState::Ready;
                report.merge(self.rebuild(snapshot, records));
            }
            Ok(Readiness::Pending) => {
                debug!("backend instance pending; deferring rebuild");
                self.state = InstanceState::Pending;
                self.pending_rebuild = Some((snapshot.clone(), records.to_vec()));
                report.buffered += 1;
            }
            Err(err) => {
                self.state = InstanceState::Uncreated;
                if let Some(failure) = self.settle(None, "instance", Err(err.into())) {
                    report.failures.push(failure);
                }
            }
        }
        report
    }

    /// The backend's ready signal: runs the deferred rebuild, then every
    /// buffered record in arrival order.
    pub fn notify_ready(&mut self) -> ApplyReport {
        if self.state != InstanceState::Pending {
            debug!("ready signal ignored in state {:?}", self.state);
            return ApplyReport::default();
        }
        self.state = InstanceState::Ready;
        let mut report = ApplyReport::default();
        if let Some((snapshot, records)) = self.pending_rebuild.take() {
            report.merge(self.rebuild(&snapshot, &records));
        }
        let buffered = std::mem::take(&mut self.buffered);
        report.merge(self.apply_batch(&buffered));
        report
    }

    /// Occurrences the backend produced since the last call.
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        let events = self.backend.poll_events();
        self.metrics.inc_by("events.polled", events.len() as u64);
        events
    }

    fn rebuild(&mut self, snapshot: &MapSnapshot, records: &[CallRecord]) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut tally = |this: &mut Self, id: Option<SequenceId>, target: &str, result| {
            match this.settle(id, target, result) {
                Some(failure) => report.failures.push(failure),
                None => report.applied += 1,
            }
        };

        for (id, def) in &snapshot.sources {
            let result = self.backend.add_source(id, def).map_err(ApplyError::from);
            tally(self, None, id.as_str(), result);
        }

        let mut added: HashSet<&str> = HashSet::new();
        for (id, entry) in &snapshot.layers {
            // A store layer that is not up yet cannot anchor the insert;
            // anything else may be a basemap layer the backend knows.
            let before = entry
                .before_id
                .as_deref()
                .filter(|b| added.contains(b) || !snapshot.layers.contains_key(*b));
            let result = self
                .backend
                .add_layer(&entry.def, before)
                .map_err(ApplyError::from);
            if result.is_ok() {
                added.insert(id.as_str());
            }
            tally(self, None, id.as_str(), result);
        }

        for (key, def) in &snapshot.controls {
            let result = self.backend.add_control(def).map_err(ApplyError::from);
            tally(self, None, &key.to_string(), result);
        }

        if let Some(data) = &snapshot.draw_data {
            let result = self
                .backend
                .invoke("loadDrawData", std::slice::from_ref(data), &Props::new())
                .map_err(ApplyError::from);
            tally(self, None, "draw_data", result);
        }

        let setters = replayable_setters(snapshot, records);
        for record in &setters {
            let result = self.apply_record(record);
            tally(self, Some(record.id), &record_target(record), result);
        }

        info!(
            "rebuilt {} surface: {} sources, {} layers, {} controls, {} setters replayed, {} failures",
            snapshot.backend,
            snapshot.sources.len(),
            snapshot.layers.len(),
            snapshot.controls.len(),
            setters.len(),
            report.failures.len()
        );
        report
    }

    fn settle(
        &mut self,
        id: Option<SequenceId>,
        target: &str,
        result: Result<(), ApplyError>,
    ) -> Option<ApplyFailure> {
        match result {
            Ok(()) => {
                self.metrics.inc("calls.applied");
                None
            }
            Err(error) => {
                match id {
                    Some(id) => warn!("call {id} for {target} failed: {error}"),
                    None => warn!("restoring {target} failed: {error}"),
                }
                self.metrics.inc("calls.failed");
                Some(ApplyFailure {
                    id,
                    target: target.to_string(),
                    error,
                })
            }
        }
    }

    fn apply_record(&mut self, record: &CallRecord) -> Result<(), ApplyError> {
        let method = Method::from(record);
        match method {
            Method::AddLayer => {
                let def: LayerDef = parse_arg(record, 0)?;
                def.validate()?;
                let before = record.kwargs.get("beforeId").and_then(Value::as_str);
                self.backend.add_layer(&def, before)?;
            }
            Method::RemoveLayer => self.backend.remove_layer(str_arg(record, 0)?)?,
            Method::AddSource => {
                let id = str_arg(record, 0)?;
                let def: SourceDef = parse_arg(record, 1)?;
                self.backend.add_source(id, &def)?;
            }
            Method::RemoveSource => self.backend.remove_source(str_arg(record, 0)?)?,
            Method::AddControl => {
                let kind = ControlKind::from(str_arg(record, 0)?.to_string());
                let def = control_def(record, kind, record.arg(1))?;
                self.backend.add_control(&def)?;
            }
            Method::AddDrawControl => {
                let def = control_def(record, ControlKind::Draw, record.arg(0))?;
                self.backend.add_control(&def)?;
            }
            Method::RemoveControl => {
                let kind = ControlKind::from(str_arg(record, 0)?.to_string());
                let position = parse_position(record, record.arg_str(1))?;
                self.backend.remove_control(&ControlKey::new(kind, position))?;
            }
            Method::SetPaintProperty | Method::SetLayoutProperty => {
                let layer = str_arg(record, 0)?;
                let name = str_arg(record, 1)?;
                let value = record.arg(2).ok_or_else(|| missing(record, 2))?;
                let target = if method == Method::SetPaintProperty {
                    PropertyTarget::Paint(layer)
                } else {
                    PropertyTarget::Layout(layer)
                };
                self.backend.set_property(target, name, value)?;
            }
            Method::SetFilter => {
                let layer = str_arg(record, 0)?;
                let filter = record.arg(1).unwrap_or(&Value::Null);
                self.backend
                    .set_property(PropertyTarget::Filter(layer), "filter", filter)?;
            }
            Method::SetStyle | Method::SetTerrain | Method::SetFog | Method::SetProjection => {
                let value = record.arg(0).unwrap_or(&Value::Null);
                self.backend
                    .set_property(PropertyTarget::Map, map_property(&method), value)?;
            }
            _ => self
                .backend
                .invoke(&record.method, &record.args, &record.kwargs)?,
        }
        Ok(())
    }
}

fn map_property(method: &Method) -> &'static str {
    match method {
        Method::SetStyle => "style",
        Method::SetTerrain => "terrain",
        Method::SetFog => "fog",
        _ => "projection",
    }
}

fn record_target(record: &CallRecord) -> String {
    let first = record.arg(0);
    first
        .and_then(|v| v.get("id"))
        .or(first)
        .and_then(Value::as_str)
        .unwrap_or(record.method.as_str())
        .to_string()
}

fn missing(record: &CallRecord, index: usize) -> ApplyError {
    ApplyError::MissingArgument {
        method: record.method.clone(),
        index,
    }
}

fn str_arg(record: &CallRecord, index: usize) -> Result<&str, ApplyError> {
    record.arg_str(index).ok_or_else(|| missing(record, index))
}

fn parse_arg<T: DeserializeOwned>(record: &CallRecord, index: usize) -> Result<T, ApplyError> {
    let value = record.arg(index).ok_or_else(|| missing(record, index))?;
    serde_json::from_value(value.clone()).map_err(|err| ApplyError::Malformed {
        method: record.method.clone(),
        reason: err.to_string(),
    })
}

fn parse_position(record: &CallRecord, position: Option<&str>) -> Result<ControlPosition, ApplyError> {
    match position {
        None => Ok(ControlPosition::default()),
        Some(p) => p.parse().map_err(|err| ApplyError::Malformed {
            method: record.method.clone(),
            reason: format!("{err}"),
        }),
    }
}

/// Control from `[{position, ...options}]`-style arguments.
fn control_def(
    record: &CallRecord,
    kind: ControlKind,
    options: Option<&Value>,
) -> Result<ControlDef, ApplyError> {
    let mut options = options
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let position = options.remove("position");
    let position = parse_position(record, position.as_ref().and_then(Value::as_str))?;
    Ok(ControlDef {
        kind,
        position,
        options,
    })
}
