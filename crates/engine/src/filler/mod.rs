//! Bulk enrichment of resolved views.
//!
//! Resolution records a [`PendingEnrichment`] for every field bound to an
//! enrichment function instead of fetching inline. [`FillerResolver::fill`]
//! groups those records by function, makes one bulk call per group, and
//! writes each result back into the view that asked for it.
//!
//! Groups are isolated from one another: a fetch that errors, panics, times
//! out or is cancelled leaves only its own fields unfilled and is reported
//! in the returned [`FillReport`].

mod function;
mod report;

use std::{
    any::Any,
    collections::{HashMap, HashSet, hash_map::Entry},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use viewforge_registry::ConfigurationError;
use viewforge_types::{FieldKind, ViewHandle, ViewValue};

pub use function::{BulkFetch, EnrichmentFunction, FnFetch, FunctionRegistry, ResultKey};
pub(crate) use function::EnrichmentKey;
pub use report::{EnrichmentGroupFailure, FillReport, GroupFailureReason, GroupOutcome};

use crate::{
    CollisionPolicy, ViewError,
    context::{PendingEnrichment, PendingEnrichments, PendingKeys},
};

/// Tuning for [`FillerResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillerOptions {
    /// Upper bound on one group's bulk fetch. `None` waits indefinitely.
    pub group_timeout: Option<Duration>,
    /// Groups fetched at the same time. Values below one are treated as one.
    pub max_concurrent_groups: usize,
    /// Send each distinct key once per group.
    pub dedupe_keys: bool,
    /// Which result wins when several answer the same key.
    pub collision_policy: CollisionPolicy,
}

impl Default for FillerOptions {
    fn default() -> Self {
        Self {
            group_timeout: None,
            max_concurrent_groups: 8,
            dedupe_keys: true,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

/// Records for one function, plus the keys to send for them.
struct EnrichmentGroup {
    function: EnrichmentFunction,
    records: Vec<PendingEnrichment>,
    keys: Vec<Value>,
    seen: HashSet<EnrichmentKey>,
}

impl EnrichmentGroup {
    fn new(function: EnrichmentFunction) -> Self {
        Self {
            function,
            records: Vec::new(),
            keys: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, record: PendingEnrichment, dedupe: bool) {
        for key in record.keys.iter() {
            if !dedupe || self.seen.insert(EnrichmentKey::of(key)) {
                self.keys.push(key.clone());
            }
        }
        self.records.push(record);
    }
}

type FetchOutcome = Result<Vec<Value>, GroupFailureReason>;

/// An adapted result waiting to be written into its view.
struct PendingWrite {
    owner: ViewHandle,
    field: String,
    value: ViewValue,
}

/// Runs deferred enrichments in bulk and writes the results into views.
#[derive(Debug, Clone, Default)]
pub struct FillerResolver {
    options: FillerOptions,
}

impl FillerResolver {
    pub fn new(options: FillerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FillerOptions {
        &self.options
    }

    /// Fills every pending record.
    ///
    /// Every record is checked against `functions` before any fetch starts.
    ///
    /// # Errors
    /// Returns [`ViewError::Configuration`] when a record names an unknown
    /// function or a field that cannot hold the function's results, and
    /// [`ViewError::Transform`] when an adapter rejects a fetched value.
    /// Failed fetches are reported in the [`FillReport`] instead.
    pub async fn fill(
        &self,
        pending: PendingEnrichments,
        functions: &FunctionRegistry,
        cancel: CancellationToken,
    ) -> Result<FillReport, ViewError> {
        if pending.is_empty() {
            return Ok(FillReport::default());
        }

        let record_count = pending.len();
        let groups = plan_groups(pending, functions, self.options.dedupe_keys)?;
        info!(groups = groups.len(), records = record_count, "filling enrichments");

        let fetched = self.fetch_groups(&groups, cancel).await;

        let mut report = FillReport::default();
        let mut writes = Vec::new();
        for (group, outcome) in groups.into_values().zip(fetched) {
            let (summary, group_writes) = self.complete_group(group, outcome)?;
            report.groups.push(summary);
            writes.extend(group_writes);
        }

        // Views are only touched once every adapter has accepted its value.
        for write in writes {
            write.owner.set(write.field, write.value);
        }
        Ok(report)
    }

    /// Blocking form of [`FillerResolver::fill`] for synchronous callers.
    pub fn fill_blocking(
        &self,
        pending: PendingEnrichments,
        functions: &FunctionRegistry,
    ) -> Result<FillReport, ViewError> {
        let filler = self.clone();
        let functions = functions.clone();
        viewforge_util::block_on_future(async move { filler.fill(pending, &functions, CancellationToken::new()).await })
            .map_err(ViewError::runtime)?
    }

    async fn fetch_groups(
        &self,
        groups: &IndexMap<String, EnrichmentGroup>,
        cancel: CancellationToken,
    ) -> Vec<Option<FetchOutcome>> {
        let limiter = Arc::new(Semaphore::new(self.options.max_concurrent_groups.max(1)));
        let mut tasks = JoinSet::new();

        for (index, group) in groups.values().enumerate() {
            let fetch = group.function.fetcher();
            let keys = group.keys.clone();
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            let timeout = self.options.group_timeout;
            debug!(function = %group.function.name(), keys = keys.len(), "dispatching bulk fetch");
            tasks.spawn(async move { (index, run_fetch(fetch, keys, limiter, cancel, timeout).await) });
        }

        let mut outcomes = vec![None; groups.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => warn!(error = %error, "enrichment task did not complete"),
            }
        }
        outcomes
    }

    fn complete_group(
        &self,
        group: EnrichmentGroup,
        outcome: Option<FetchOutcome>,
    ) -> Result<(GroupOutcome, Vec<PendingWrite>), ViewError> {
        let name = group.function.name().to_string();
        let mut summary = GroupOutcome {
            function: name.clone(),
            records: group.records.len(),
            keys_requested: group.keys.len(),
            ..GroupOutcome::default()
        };

        let results = match outcome.unwrap_or_else(|| Err(GroupFailureReason::Aborted("task did not complete".into()))) {
            Ok(results) => results,
            Err(reason) => {
                warn!(function = %name, reason = %reason, unfilled = summary.records, "enrichment group failed");
                summary.failure = Some(EnrichmentGroupFailure {
                    function: name,
                    reason,
                    unfilled: summary.records,
                });
                return Ok((summary, Vec::new()));
            }
        };

        summary.results = results.len();
        let index = self.index_results(&group.function, results);
        let mut writes = Vec::with_capacity(group.records.len());
        for record in &group.records {
            match prepare_write(record, &index)? {
                Some(write) => writes.push(write),
                None => summary.missing += 1,
            }
        }
        summary.filled = writes.len();

        debug!(
            function = %name,
            filled = summary.filled,
            missing = summary.missing,
            "enrichment group matched"
        );
        Ok((summary, writes))
    }

    fn index_results(&self, function: &EnrichmentFunction, results: Vec<Value>) -> HashMap<EnrichmentKey, Value> {
        let mut index = HashMap::with_capacity(results.len());
        for result in results {
            if !function.result_kind().admits(&result) {
                debug!(function = %function.name(), "result does not match the declared result kind; ignored");
                continue;
            }
            let Some(key) = function.result_key().extract(&result) else {
                trace!(function = %function.name(), "result carries no key; ignored");
                continue;
            };
            match index.entry(EnrichmentKey::of(&key)) {
                Entry::Vacant(slot) => {
                    slot.insert(result);
                }
                Entry::Occupied(mut slot) => {
                    debug!(function = %function.name(), key = %key, policy = ?self.options.collision_policy, "several results share a key");
                    if self.options.collision_policy == CollisionPolicy::LastWins {
                        slot.insert(result);
                    }
                }
            }
        }
        index
    }
}

/// Groups records by function in first-seen order, rejecting any record the
/// registered functions cannot serve.
fn plan_groups(
    pending: PendingEnrichments,
    functions: &FunctionRegistry,
    dedupe: bool,
) -> Result<IndexMap<String, EnrichmentGroup>, ConfigurationError> {
    let mut groups: IndexMap<String, EnrichmentGroup> = IndexMap::new();
    for record in pending {
        let function = functions.get(&record.function).ok_or_else(|| ConfigurationError::UnknownFunction {
            view_type: record.owner.view_type().to_string(),
            field: record.binding.name.clone(),
            function: record.function.clone(),
        })?;
        check_target(&record, function)?;
        groups
            .entry(record.function.clone())
            .or_insert_with(|| EnrichmentGroup::new(function.clone()))
            .push(record, dedupe);
    }
    Ok(groups)
}

fn check_target(record: &PendingEnrichment, function: &EnrichmentFunction) -> Result<(), ConfigurationError> {
    let kind = &record.binding.kind;
    let result_kind = function.result_kind();
    let fits = match record.keys {
        PendingKeys::One(_) => kind.can_hold_one(result_kind),
        PendingKeys::Many(_) => kind.can_hold_many(result_kind),
    };
    if fits {
        return Ok(());
    }
    Err(ConfigurationError::IncompatibleEnrichmentTarget {
        view_type: record.owner.view_type().to_string(),
        field: record.binding.name.clone(),
        function: function.name().to_string(),
        field_kind: kind.to_string(),
        result_kind: result_kind.to_string(),
    })
}

async fn run_fetch(
    fetch: Arc<dyn BulkFetch>,
    keys: Vec<Value>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> FetchOutcome {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GroupFailureReason::Cancelled),
        permit = limiter.acquire_owned() => permit.map_err(|error| GroupFailureReason::Aborted(error.to_string()))?,
    };

    let call = AssertUnwindSafe(fetch.fetch(keys)).catch_unwind();
    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GroupFailureReason::TimedOut(limit)),
            None => Ok(call.await),
        }
    };

    let completed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GroupFailureReason::Cancelled),
        completed = bounded => completed?,
    };

    match completed {
        Ok(Ok(results)) => Ok(results),
        Ok(Err(error)) => Err(GroupFailureReason::Fetch(format!("{error:#}"))),
        Err(panic) => Err(GroupFailureReason::Aborted(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "bulk fetch panicked".to_string())
}

/// Adapts the matching result(s) for the owning view. Returns `None` when
/// nothing matched and the field stays absent.
fn prepare_write(record: &PendingEnrichment, index: &HashMap<EnrichmentKey, Value>) -> Result<Option<PendingWrite>, ViewError> {
    let binding = &record.binding;
    let value = match &record.keys {
        PendingKeys::One(key) => match index.get(&EnrichmentKey::of(key)) {
            Some(result) => ViewValue::Data(result.clone()),
            None => return Ok(None),
        },
        PendingKeys::Many(keys) => {
            let found: Vec<ViewValue> = keys
                .iter()
                .filter_map(|key| index.get(&EnrichmentKey::of(key)))
                .map(|result| ViewValue::Data(result.clone()))
                .collect();
            if found.is_empty() {
                return Ok(None);
            }
            match binding.kind {
                FieldKind::Set(_) => ViewValue::set_of(found),
                _ => ViewValue::List(found),
            }
        }
    };

    let adapted = binding
        .apply_adapter(value)
        .map_err(|error| ViewError::transform(record.owner.view_type().as_str(), &binding.name, error))?;
    Ok(Some(PendingWrite {
        owner: record.owner.clone(),
        field: binding.name.clone(),
        value: adapted,
    }))
}
