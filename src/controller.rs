//! Month-scoped habit view model.
//!
//! [`HabitsMonthController`] owns the habits of the selected month and is the
//! only thing that mutates them. Operations are `async fn(&self)` so a caller
//! can keep several in flight at once (navigate while a toggle is pending,
//! toggle two different cells, ...). State sits behind a single lock that is
//! taken only between awaits, so every mutation is atomic with respect to one
//! turn of the caller's event loop.
//!
//! Toggles are optimistic: the cell flips immediately, then the server's day
//! map replaces it on success or the old value is put back on failure. Create,
//! rename and delete only touch local state after the server acknowledges.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::date_window::{DateWindow, Direction, YearMonth};
use crate::error::{ConflictError, Error, RemoteError, Result, ValidationError};
use crate::gateway::{GatewayResult, HabitsGateway};
use crate::habit::{validate_habit_name, CompletionDays, HabitId, HabitRecord};

/// What happened to a month load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response replaced the records; carries the habit count.
    Applied(usize),
    /// The selection moved on before the response arrived.
    Discarded,
    /// Nothing was requested (backward navigation at the earliest month).
    Unchanged,
}

/// Lifecycle of one optimistic toggle. A toggle that fails its
/// preconditions never leaves `Idle` and sends nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogglePhase {
    Idle,
    Optimistic,
    Reconciled,
    RolledBack,
}

/// A cell currently being toggled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToggleKey {
    pub habit_id: HabitId,
    pub day: u32,
}

/// A rename waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDraft {
    pub habit_id: HabitId,
    pub current_name: String,
}

/// Read-only copy of the controller state for rendering.
#[derive(Debug, Clone)]
pub struct MonthView {
    pub selected: YearMonth,
    pub window: DateWindow,
    pub can_navigate_backward: bool,
    /// True until records for `selected` have arrived.
    pub is_loading: bool,
    pub records: Vec<HabitRecord>,
    pub pending_toggles: Vec<ToggleKey>,
    pub creating: bool,
    pub staged_delete: Option<HabitId>,
    pub staged_rename: Option<RenameDraft>,
    pub last_error: Option<RemoteError>,
}

impl MonthView {
    /// Whether `day` of the selected month accepts toggles.
    #[must_use]
    pub fn is_editable(&self, day: u32) -> bool {
        self.window.is_editable(day, self.selected)
    }

    #[must_use]
    pub fn is_pending(&self, habit_id: &HabitId, day: u32) -> bool {
        self.pending_toggles
            .iter()
            .any(|key| &key.habit_id == habit_id && key.day == day)
    }

    #[must_use]
    pub fn record(&self, habit_id: &HabitId) -> Option<&HabitRecord> {
        self.records.iter().find(|r| r.habit_id() == habit_id)
    }
}

struct ControllerState {
    window: DateWindow,
    selected: YearMonth,
    records: Vec<HabitRecord>,
    /// Month the current `records` were fetched for.
    loaded_for: Option<YearMonth>,
    /// Bumped for every month request; only the latest one may apply.
    load_generation: u64,
    pending_toggles: HashSet<ToggleKey>,
    creating: bool,
    staged_delete: Option<HabitId>,
    staged_rename: Option<RenameDraft>,
    last_error: Option<RemoteError>,
}

impl ControllerState {
    fn position(&self, habit_id: &HabitId) -> Option<usize> {
        self.records.iter().position(|r| r.habit_id() == habit_id)
    }

    fn require(&self, habit_id: &HabitId) -> std::result::Result<&HabitRecord, ValidationError> {
        self.records
            .iter()
            .find(|r| r.habit_id() == habit_id)
            .ok_or_else(|| ValidationError::UnknownHabit(habit_id.to_string()))
    }

    /// Move the selection, dropping records that belong to the old month.
    fn select(&mut self, target: YearMonth) -> std::result::Result<(), ValidationError> {
        if !target.is_valid() {
            return Err(ValidationError::InvalidMonth(target.month));
        }
        if let Some(earliest) = self.window.earliest.filter(|_| self.window.is_before_earliest(target)) {
            return Err(ValidationError::BeforeEarliestMonth {
                month: target,
                earliest,
            });
        }
        if self.selected != target {
            self.selected = target;
            self.records.clear();
            self.loaded_for = None;
        }
        Ok(())
    }

    /// Start a month request and return its generation.
    fn begin_load(&mut self) -> u64 {
        self.load_generation = self.load_generation.wrapping_add(1);
        self.load_generation
    }

    /// Apply a month response if it is still relevant.
    ///
    /// A response is stale when the selection moved to another month or a
    /// newer request went out after it, even for the same month.
    fn reconcile_month(
        &mut self,
        requested: YearMonth,
        generation: u64,
        result: GatewayResult<Vec<HabitRecord>>,
    ) -> Result<usize> {
        if self.selected != requested || self.load_generation != generation {
            return Err(Error::StaleResponseDiscarded { requested });
        }
        match result {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                self.loaded_for = Some(requested);
                Ok(count)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Record a remote failure for display and hand it back as an [`Error`].
    fn fail(&mut self, err: RemoteError) -> Error {
        self.last_error = Some(err.clone());
        err.into()
    }

    fn view(&self) -> MonthView {
        let mut pending_toggles: Vec<ToggleKey> = self.pending_toggles.iter().cloned().collect();
        pending_toggles.sort_by(|a, b| (&a.habit_id, a.day).cmp(&(&b.habit_id, b.day)));
        MonthView {
            selected: self.selected,
            window: self.window,
            can_navigate_backward: self.window.can_navigate_backward(self.selected),
            is_loading: self.loaded_for != Some(self.selected),
            records: self.records.clone(),
            pending_toggles,
            creating: self.creating,
            staged_delete: self.staged_delete.clone(),
            staged_rename: self.staged_rename.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// One optimistic toggle, from snapshot to settlement.
///
/// Holding the op keeps its cell marked pending; dropping it (settled or
/// cancelled) unmarks the cell.
struct ToggleOp<'a> {
    state: &'a Mutex<ControllerState>,
    key: ToggleKey,
    month: YearMonth,
    snapshot: HabitRecord,
    phase: TogglePhase,
}

impl<'a> ToggleOp<'a> {
    /// Idle -> Optimistic: check preconditions, snapshot the record, flip the cell.
    fn begin(state: &'a Mutex<ControllerState>, habit_id: &HabitId, day: u32) -> Result<Self> {
        let mut guard = state.lock();
        let month = guard.selected;
        if !guard.window.is_editable(day, month) {
            return Err(ValidationError::DayNotEditable { day, month }.into());
        }
        let index = guard
            .position(habit_id)
            .ok_or_else(|| ValidationError::UnknownHabit(habit_id.to_string()))?;
        let key = ToggleKey {
            habit_id: habit_id.clone(),
            day,
        };
        if guard.pending_toggles.contains(&key) {
            return Err(ConflictError::ToggleInProgress {
                habit_id: habit_id.to_string(),
                day,
            }
            .into());
        }

        let snapshot = guard.records[index].clone();
        guard.records[index] = snapshot.with_toggled_day(day);
        guard.pending_toggles.insert(key.clone());
        drop(guard);

        Ok(Self {
            state,
            key,
            month,
            snapshot,
            phase: TogglePhase::Optimistic,
        })
    }

    /// Optimistic -> Reconciled: the server's day map replaces ours wholesale.
    fn reconcile(mut self, days: CompletionDays) -> HabitRecord {
        let authoritative = self.snapshot.with_days(days);
        let mut state = self.state.lock();
        if state.selected == self.month {
            if let Some(index) = state.position(&self.key.habit_id) {
                state.records[index] = state.records[index].with_days(authoritative.days().clone());
            }
        } else {
            debug!(
                habit_id = %self.key.habit_id,
                month = %self.month,
                "Toggle settled after leaving its month, not applying"
            );
        }
        self.phase = TogglePhase::Reconciled;
        authoritative
    }

    /// Optimistic -> RolledBack: put the snapshot's value back for this cell only.
    fn roll_back(mut self, err: RemoteError) -> Error {
        let mut state = self.state.lock();
        if state.selected == self.month {
            if let Some(index) = state.position(&self.key.habit_id) {
                let previous = self.snapshot.is_completed(self.key.day);
                state.records[index] = state.records[index].with_day(self.key.day, previous);
            }
        }
        warn!(
            habit_id = %self.key.habit_id,
            day = self.key.day,
            error = %err,
            "Toggle failed, rolled back"
        );
        self.phase = TogglePhase::RolledBack;
        state.fail(err)
    }
}

impl Drop for ToggleOp<'_> {
    fn drop(&mut self) {
        if self.phase == TogglePhase::Optimistic {
            debug!(habit_id = %self.key.habit_id, day = self.key.day, "Toggle abandoned");
        }
        self.state.lock().pending_toggles.remove(&self.key);
    }
}

/// Clears the `creating` flag however the create ends.
struct CreatingGuard<'a>(&'a Mutex<ControllerState>);

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().creating = false;
    }
}

/// View model for one month of habits.
pub struct HabitsMonthController {
    gateway: Arc<dyn HabitsGateway>,
    state: Mutex<ControllerState>,
}

impl HabitsMonthController {
    /// Start on the month containing `window.today`. Nothing is fetched yet.
    pub fn new(gateway: Arc<dyn HabitsGateway>, window: DateWindow) -> Self {
        let selected = window.current_month();
        Self {
            gateway,
            state: Mutex::new(ControllerState {
                window,
                selected,
                records: Vec::new(),
                loaded_for: None,
                load_generation: 0,
                pending_toggles: HashSet::new(),
                creating: false,
                staged_delete: None,
                staged_rename: None,
                last_error: None,
            }),
        }
    }

    /// Snapshot for the presentation layer.
    #[must_use]
    pub fn snapshot(&self) -> MonthView {
        self.state.lock().view()
    }

    #[must_use]
    pub fn selected(&self) -> YearMonth {
        self.state.lock().selected
    }

    #[must_use]
    pub fn records(&self) -> Vec<HabitRecord> {
        self.state.lock().records.clone()
    }

    #[must_use]
    pub fn can_navigate_backward(&self) -> bool {
        let state = self.state.lock();
        state.window.can_navigate_backward(state.selected)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<RemoteError> {
        self.state.lock().last_error.clone()
    }

    /// Hand the last remote error to the caller and forget it.
    pub fn take_last_error(&self) -> Option<RemoteError> {
        self.state.lock().last_error.take()
    }

    /// Fetch the earliest navigable month, then the selected month.
    ///
    /// A failed start-month lookup is logged and kept in `last_error`; the
    /// boundary stays unknown and the month still loads. Only a failed month
    /// load is returned.
    pub async fn initialize(&self) -> Result<LoadOutcome> {
        if let Err(err) = self.load_start().await {
            warn!(error = %err, "Continuing without the earliest month");
        }
        let selected = self.selected();
        self.fetch(selected).await
    }

    /// Ask the backend for the earliest month with habit data.
    pub async fn load_start(&self) -> Result<Option<YearMonth>> {
        let result = self.gateway.start_month().await;
        let mut state = self.state.lock();
        match result {
            Ok(earliest) => {
                state.window.earliest = earliest;
                debug!(earliest = ?earliest, "Earliest month loaded");
                Ok(earliest)
            }
            Err(err) => {
                warn!(error = %err, "Failed to fetch start month");
                Err(state.fail(err))
            }
        }
    }

    /// Select `(month, year)` and fetch its habits.
    pub async fn load_month(&self, month: u32, year: i32) -> Result<LoadOutcome> {
        let target = YearMonth::new(month, year);
        self.state.lock().select(target)?;
        self.fetch(target).await
    }

    /// Same as [`Self::load_month`]; entry point for month pickers.
    pub async fn select_month(&self, month: u32, year: i32) -> Result<LoadOutcome> {
        self.load_month(month, year).await
    }

    /// Step the selection one month. Stepping back from the earliest month does nothing.
    pub async fn navigate(&self, direction: Direction) -> Result<LoadOutcome> {
        let target = {
            let mut state = self.state.lock();
            let Some(target) = state.window.step(state.selected, direction) else {
                debug!(selected = %state.selected, "Already at earliest month");
                return Ok(LoadOutcome::Unchanged);
            };
            state.select(target)?;
            target
        };
        self.fetch(target).await
    }

    async fn fetch(&self, target: YearMonth) -> Result<LoadOutcome> {
        let generation = self.state.lock().begin_load();
        let result = self.gateway.list_habits(target).await;
        let mut state = self.state.lock();
        match state.reconcile_month(target, generation, result) {
            Ok(count) => {
                debug!(month = %target, count, "Habits loaded");
                Ok(LoadOutcome::Applied(count))
            }
            Err(Error::StaleResponseDiscarded { requested }) => {
                debug!(requested = %requested, selected = %state.selected, "Discarding stale month response");
                Ok(LoadOutcome::Discarded)
            }
            Err(err) => {
                warn!(month = %target, error = %err, "Failed to fetch habits");
                Err(err)
            }
        }
    }

    /// Create a habit and refresh the selected month so it shows up.
    pub async fn create_habit(&self, name: &str) -> Result<Option<HabitId>> {
        let name = validate_habit_name(name)?;
        let _creating = {
            let mut state = self.state.lock();
            if state.creating {
                return Err(ConflictError::CreateInProgress.into());
            }
            state.creating = true;
            CreatingGuard(&self.state)
        };

        let result = self
            .gateway
            .create_habit(&name)
            .await
            .and_then(|response| {
                if response.success {
                    Ok(response)
                } else {
                    Err(RemoteError::rejected(format!("creating '{name}' was not accepted")))
                }
            });
        let (response, target) = {
            let mut state = self.state.lock();
            match result {
                Ok(response) => (response, state.selected),
                Err(err) => {
                    warn!(error = %err, "Create habit failed");
                    return Err(state.fail(err));
                }
            }
        };
        info!("Created habit '{name}'");

        let created = response.habit;
        if let Err(err) = self.fetch(target).await {
            warn!(error = %err, "Refetch after create failed");
            let mut state = self.state.lock();
            if let Some(habit) = created.as_ref().filter(|_| state.selected == target) {
                if state.position(&habit.habit_id).is_none() {
                    state.records.push(HabitRecord::new(
                        habit.habit_id.clone(),
                        habit.name.clone(),
                        target.days(),
                    ));
                }
            }
        }
        Ok(created.map(|habit| habit.habit_id))
    }

    /// Optimistically flip `day` of a habit in the selected month.
    ///
    /// Returns the record as the server sees it after the toggle.
    pub async fn toggle_day(&self, habit_id: &HabitId, day: u32) -> Result<HabitRecord> {
        let op = ToggleOp::begin(&self.state, habit_id, day)?;
        match self.gateway.toggle_day(habit_id, day, op.month).await {
            Ok(response) => Ok(op.reconcile(response.days)),
            Err(err) => Err(op.roll_back(err)),
        }
    }

    /// Stage a habit for deletion; nothing is sent until [`Self::confirm_delete`].
    pub fn request_delete(&self, habit_id: &HabitId) -> Result<()> {
        let mut state = self.state.lock();
        state.require(habit_id)?;
        state.staged_delete = Some(habit_id.clone());
        Ok(())
    }

    pub fn cancel_delete(&self) {
        self.state.lock().staged_delete = None;
    }

    /// Delete the staged habit. The record disappears only after the server agrees.
    pub async fn confirm_delete(&self) -> Result<HabitId> {
        let habit_id = self
            .state
            .lock()
            .staged_delete
            .take()
            .ok_or(ValidationError::NothingStaged)?;

        let result = self
            .gateway
            .delete_habit(&habit_id)
            .await
            .and_then(|ack| ack.into_result("delete"));

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.records.retain(|r| r.habit_id() != &habit_id);
                info!(habit_id = %habit_id, "Deleted habit");
                Ok(habit_id)
            }
            Err(err) => {
                warn!(habit_id = %habit_id, error = %err, "Delete failed");
                Err(state.fail(err))
            }
        }
    }

    /// Stage a habit for renaming.
    pub fn request_rename(&self, habit_id: &HabitId) -> Result<RenameDraft> {
        let mut state = self.state.lock();
        let draft = RenameDraft {
            habit_id: habit_id.clone(),
            current_name: state.require(habit_id)?.name().to_string(),
        };
        state.staged_rename = Some(draft.clone());
        Ok(draft)
    }

    pub fn cancel_rename(&self) {
        self.state.lock().staged_rename = None;
    }

    /// Rename the staged habit. On failure the draft stays staged for a retry.
    pub async fn confirm_rename(&self, new_name: &str) -> Result<String> {
        let (habit_id, name) = {
            let state = self.state.lock();
            let draft = state
                .staged_rename
                .as_ref()
                .ok_or(ValidationError::NothingStaged)?;
            let name = match state.position(&draft.habit_id) {
                Some(index) => state.records[index].with_renamed(new_name)?.name().to_string(),
                None => validate_habit_name(new_name)?,
            };
            (draft.habit_id.clone(), name)
        };

        let result = self
            .gateway
            .rename_habit(&habit_id, &name)
            .await
            .and_then(|ack| ack.into_result("rename"));

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                if let Some(index) = state.position(&habit_id) {
                    if let Ok(renamed) = state.records[index].with_renamed(&name) {
                        state.records[index] = renamed;
                    }
                }
                if state
                    .staged_rename
                    .as_ref()
                    .is_some_and(|draft| draft.habit_id == habit_id)
                {
                    state.staged_rename = None;
                }
                info!(habit_id = %habit_id, "Renamed habit to '{name}'");
                Ok(name)
            }
            Err(err) => {
                warn!(habit_id = %habit_id, error = %err, "Rename failed");
                Err(state.fail(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Ack, CreateHabitResponse, CreatedHabit, ToggleResponse};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Call {
        Start,
        List(YearMonth),
        Create,
        Toggle(HabitId, u32),
        Rename(HabitId),
        Delete(HabitId),
    }

    /// In-memory backend with per-call gates and scripted failures.
    #[derive(Default)]
    struct FakeGateway {
        start: Option<YearMonth>,
        habits: Mutex<Vec<(HabitId, String)>>,
        completions: Mutex<HashMap<(HabitId, YearMonth), CompletionDays>>,
        next_id: Mutex<u64>,
        gates: Mutex<HashMap<Call, oneshot::Receiver<()>>>,
        failures: Mutex<HashMap<Call, RemoteError>>,
        calls: Mutex<Vec<Call>>,
        reject_create: bool,
    }

    impl FakeGateway {
        fn with_habits(start: Option<YearMonth>, names: &[(&str, &str)]) -> Self {
            Self {
                start,
                habits: Mutex::new(
                    names
                        .iter()
                        .map(|(id, name)| (HabitId::from(*id), (*name).to_string()))
                        .collect(),
                ),
                ..Self::default()
            }
        }

        /// Hold `call` until the returned sender fires.
        fn gate(&self, call: Call) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(call, rx);
            tx
        }

        fn fail(&self, call: Call, err: RemoteError) {
            self.failures.lock().insert(call, err);
        }

        fn mark_done(&self, habit_id: &str, month: YearMonth, day: u32) {
            self.completions
                .lock()
                .entry((HabitId::from(habit_id), month))
                .or_default()
                .set(day, true);
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.lock().iter().filter(|c| *c == call).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().len()
        }

        async fn enter(&self, call: Call) -> GatewayResult<()> {
            self.calls.lock().push(call.clone());
            let gate = self.gates.lock().remove(&call);
            let failure = self.failures.lock().remove(&call);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            failure.map_or(Ok(()), Err)
        }
    }

    #[async_trait]
    impl HabitsGateway for FakeGateway {
        async fn start_month(&self) -> GatewayResult<Option<YearMonth>> {
            self.enter(Call::Start).await?;
            Ok(self.start)
        }

        async fn list_habits(&self, month: YearMonth) -> GatewayResult<Vec<HabitRecord>> {
            // Answer with the data as it was when the request arrived.
            let records: Vec<HabitRecord> = {
                let completions = self.completions.lock();
                self.habits
                    .lock()
                    .iter()
                    .map(|(id, name)| {
                        let days = completions
                            .get(&(id.clone(), month))
                            .cloned()
                            .unwrap_or_default();
                        HabitRecord::new(id.clone(), name.clone(), month.days()).with_days(days)
                    })
                    .collect()
            };
            self.enter(Call::List(month)).await?;
            Ok(records)
        }

        async fn create_habit(&self, name: &str) -> GatewayResult<CreateHabitResponse> {
            self.enter(Call::Create).await?;
            if self.reject_create {
                return Ok(CreateHabitResponse {
                    success: false,
                    habit: None,
                });
            }
            let id = {
                let mut next = self.next_id.lock();
                *next += 1;
                HabitId::from(format!("new-{}", *next))
            };
            self.habits.lock().push((id.clone(), name.to_string()));
            Ok(CreateHabitResponse {
                success: true,
                habit: Some(CreatedHabit {
                    habit_id: id,
                    name: name.to_string(),
                }),
            })
        }

        async fn toggle_day(
            &self,
            habit_id: &HabitId,
            day: u32,
            month: YearMonth,
        ) -> GatewayResult<ToggleResponse> {
            self.enter(Call::Toggle(habit_id.clone(), day)).await?;
            let mut completions = self.completions.lock();
            let days = completions.entry((habit_id.clone(), month)).or_default();
            let done = days.contains(day);
            days.set(day, !done);
            Ok(ToggleResponse { days: days.clone() })
        }

        async fn rename_habit(&self, habit_id: &HabitId, name: &str) -> GatewayResult<Ack> {
            self.enter(Call::Rename(habit_id.clone())).await?;
            for (id, current) in self.habits.lock().iter_mut() {
                if id == habit_id {
                    *current = name.to_string();
                }
            }
            Ok(Ack::ok())
        }

        async fn delete_habit(&self, habit_id: &HabitId) -> GatewayResult<Ack> {
            self.enter(Call::Delete(habit_id.clone())).await?;
            self.habits.lock().retain(|(id, _)| id != habit_id);
            Ok(Ack::ok())
        }
    }

    /// Poll `fut` once so it runs up to its first suspension point.
    async fn run_until_parked<F: Future>(fut: Pin<&mut F>) {
        tokio::select! {
            biased;
            _ = fut => panic!("operation finished before the gateway released it"),
            () = std::future::ready(()) => {}
        }
    }

    const MARCH: YearMonth = YearMonth::new(3, 2024);

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn id(raw: &str) -> HabitId {
        HabitId::from(raw)
    }

    async fn setup(fake: FakeGateway) -> (Arc<FakeGateway>, HabitsMonthController) {
        let fake = Arc::new(fake);
        let controller = HabitsMonthController::new(fake.clone(), DateWindow::new(today()));
        controller.initialize().await.unwrap();
        (fake, controller)
    }

    fn two_habits() -> FakeGateway {
        FakeGateway::with_habits(
            Some(YearMonth::new(1, 2024)),
            &[("7", "Read"), ("8", "Run")],
        )
    }

    #[tokio::test]
    async fn test_initialize_loads_current_month_and_boundary() {
        let (fake, controller) = setup(two_habits()).await;
        let view = controller.snapshot();
        assert_eq!(view.selected, MARCH);
        assert_eq!(view.window.earliest, Some(YearMonth::new(1, 2024)));
        assert!(!view.is_loading);
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.records[0].name(), "Read");
        assert_eq!(view.records[0].total_days(), 31);
        assert_eq!(fake.count(&Call::List(MARCH)), 1);
    }

    #[tokio::test]
    async fn test_navigate_back_stops_at_earliest_month() {
        let (fake, controller) = setup(two_habits()).await;

        assert_eq!(
            controller.navigate(Direction::Previous).await.unwrap(),
            LoadOutcome::Applied(2)
        );
        assert_eq!(controller.selected(), YearMonth::new(2, 2024));
        assert!(controller.can_navigate_backward());

        controller.navigate(Direction::Previous).await.unwrap();
        assert_eq!(controller.selected(), YearMonth::new(1, 2024));
        assert!(!controller.can_navigate_backward());

        let calls = fake.total_calls();
        assert_eq!(
            controller.navigate(Direction::Previous).await.unwrap(),
            LoadOutcome::Unchanged
        );
        assert_eq!(controller.selected(), YearMonth::new(1, 2024));
        assert_eq!(fake.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_navigate_next_rolls_into_next_year() {
        let (_fake, controller) = setup(two_habits()).await;
        controller.load_month(12, 2024).await.unwrap();
        controller.navigate(Direction::Next).await.unwrap();
        assert_eq!(controller.selected(), YearMonth::new(1, 2025));
        assert_eq!(controller.records()[0].total_days(), 31);
    }

    #[tokio::test]
    async fn test_load_month_rejects_invalid_targets() {
        let (fake, controller) = setup(two_habits()).await;
        let calls = fake.total_calls();

        let err = controller.load_month(13, 2024).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidMonth(13))));

        let err = controller.load_month(12, 2023).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::BeforeEarliestMonth { .. })
        ));
        assert_eq!(controller.selected(), MARCH);
        assert_eq!(fake.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_stale_month_response_is_discarded() {
        let (fake, controller) = setup(two_habits()).await;
        fake.mark_done("7", YearMonth::new(2, 2024), 3);
        let release = fake.gate(Call::List(YearMonth::new(1, 2024)));

        let load_jan = controller.load_month(1, 2024);
        tokio::pin!(load_jan);
        run_until_parked(load_jan.as_mut()).await;
        assert!(controller.snapshot().is_loading);

        controller.load_month(2, 2024).await.unwrap();
        let before = controller.records();
        assert!(before[0].is_completed(3));

        release.send(()).unwrap();
        assert_eq!(load_jan.await.unwrap(), LoadOutcome::Discarded);
        assert_eq!(controller.selected(), YearMonth::new(2, 2024));
        assert_eq!(controller.records(), before);
        assert!(controller.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_stale_load_is_silent() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::List(YearMonth::new(1, 2024)));
        fake.fail(
            Call::List(YearMonth::new(1, 2024)),
            RemoteError::Transport("reset".to_string()),
        );

        let load_jan = controller.load_month(1, 2024);
        tokio::pin!(load_jan);
        run_until_parked(load_jan.as_mut()).await;
        controller.load_month(2, 2024).await.unwrap();
        release.send(()).unwrap();

        assert_eq!(load_jan.await.unwrap(), LoadOutcome::Discarded);
        assert!(controller.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_load_surfaces_error() {
        let (fake, controller) = setup(two_habits()).await;
        fake.fail(Call::List(YearMonth::new(2, 2024)), RemoteError::Unauthorized);

        let err = controller.navigate(Direction::Previous).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(controller.take_last_error(), Some(RemoteError::Unauthorized));
        assert!(controller.last_error().is_none());
        assert!(controller.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_toggle_is_optimistic_then_reconciled() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Toggle(id("7"), 15));

        let toggle_id = id("7");
        let toggle = controller.toggle_day(&toggle_id, 15);
        tokio::pin!(toggle);
        run_until_parked(toggle.as_mut()).await;

        let view = controller.snapshot();
        let record = view.record(&id("7")).unwrap();
        assert!(record.is_completed(15));
        assert_eq!(record.completed_days(), 1);
        assert_eq!(record.percentage(), 3);
        assert!(view.is_pending(&id("7"), 15));

        release.send(()).unwrap();
        let settled = toggle.await.unwrap();
        assert!(settled.is_completed(15));

        let view = controller.snapshot();
        assert_eq!(view.record(&id("7")).unwrap(), &settled);
        assert!(view.pending_toggles.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_failure_rolls_back() {
        let (fake, controller) = setup(two_habits()).await;
        let original = controller.records()[0].clone();
        fake.fail(
            Call::Toggle(id("7"), 15),
            RemoteError::Status {
                status: 500,
                message: "boom".to_string(),
            },
        );

        let err = controller.toggle_day(&id("7"), 15).await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Status { status: 500, .. })));

        let view = controller.snapshot();
        let record = view.record(&id("7")).unwrap();
        assert_eq!(record, &original);
        assert_eq!(record.completed_days(), 0);
        assert_eq!(record.percentage(), 0);
        assert!(view.pending_toggles.is_empty());
        assert!(view.last_error.is_some());
    }

    #[tokio::test]
    async fn test_server_day_map_replaces_local_one() {
        let (fake, controller) = setup(two_habits()).await;
        // Another device completed yesterday after our load.
        fake.mark_done("7", MARCH, 14);

        let record = controller.toggle_day(&id("7"), 15).await.unwrap();
        assert!(record.is_completed(14));
        assert!(record.is_completed(15));
        assert_eq!(controller.records()[0].completed_days(), 2);
    }

    #[tokio::test]
    async fn test_second_toggle_on_pending_cell_conflicts() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Toggle(id("7"), 15));

        let first_id = id("7");
        let first = controller.toggle_day(&first_id, 15);
        tokio::pin!(first);
        run_until_parked(first.as_mut()).await;

        let err = controller.toggle_day(&id("7"), 15).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(ConflictError::ToggleInProgress { day: 15, .. })
        ));
        assert_eq!(fake.count(&Call::Toggle(id("7"), 15)), 1);
        assert!(controller.records()[0].is_completed(15));

        release.send(()).unwrap();
        first.await.unwrap();
        controller.toggle_day(&id("7"), 15).await.unwrap();
        assert!(!controller.records()[0].is_completed(15));
    }

    #[tokio::test]
    async fn test_other_cells_are_not_blocked_by_pending_toggle() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Toggle(id("7"), 15));

        let first_id = id("7");
        let first = controller.toggle_day(&first_id, 15);
        tokio::pin!(first);
        run_until_parked(first.as_mut()).await;

        controller.toggle_day(&id("7"), 14).await.unwrap();
        controller.toggle_day(&id("8"), 15).await.unwrap();

        release.send(()).unwrap();
        first.await.unwrap();
        let records = controller.records();
        assert!(records[0].is_completed(14));
        assert!(records[0].is_completed(15));
        assert!(records[1].is_completed(15));
    }

    #[tokio::test]
    async fn test_rollback_keeps_other_optimistic_cells() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Toggle(id("7"), 15));
        fake.fail(Call::Toggle(id("7"), 15), RemoteError::Timeout);
        let hold_14 = fake.gate(Call::Toggle(id("7"), 14));

        let failing_id = id("7");
        let failing = controller.toggle_day(&failing_id, 15);
        tokio::pin!(failing);
        run_until_parked(failing.as_mut()).await;
        let other_id = id("7");
        let other = controller.toggle_day(&other_id, 14);
        tokio::pin!(other);
        run_until_parked(other.as_mut()).await;

        release.send(()).unwrap();
        assert!(failing.await.is_err());
        let record = controller.records()[0].clone();
        assert!(!record.is_completed(15));
        assert!(record.is_completed(14));

        hold_14.send(()).unwrap();
        other.await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_preconditions_send_nothing() {
        let (fake, controller) = setup(two_habits()).await;
        let calls = fake.total_calls();

        let err = controller.toggle_day(&id("7"), 10).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DayNotEditable { day: 10, .. })
        ));

        let err = controller.toggle_day(&id("99"), 15).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownHabit(_))));

        controller.navigate(Direction::Previous).await.unwrap();
        let err = controller.toggle_day(&id("7"), 15).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::DayNotEditable { .. })));

        assert_eq!(fake.total_calls(), calls + 1);
        assert!(controller.records().iter().all(|r| r.days().is_empty()));
    }

    #[tokio::test]
    async fn test_toggle_settling_after_navigation_leaves_new_month_alone() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Toggle(id("7"), 15));

        let toggle_id = id("7");
        let toggle = controller.toggle_day(&toggle_id, 15);
        tokio::pin!(toggle);
        run_until_parked(toggle.as_mut()).await;

        controller.navigate(Direction::Next).await.unwrap();
        let april = controller.records();

        release.send(()).unwrap();
        toggle.await.unwrap();
        assert_eq!(controller.records(), april);
        assert!(controller.snapshot().pending_toggles.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_locally() {
        let (fake, controller) = setup(two_habits()).await;
        let calls = fake.total_calls();
        let before = controller.records();

        let err = controller.create_habit("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyName)));
        assert_eq!(fake.total_calls(), calls);
        assert_eq!(controller.records(), before);
    }

    #[tokio::test]
    async fn test_create_refetches_month() {
        let (fake, controller) = setup(two_habits()).await;
        let created = controller.create_habit("  Meditate ").await.unwrap();

        let records = controller.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].name(), "Meditate");
        assert_eq!(records[2].total_days(), 31);
        assert_eq!(created.as_ref(), Some(records[2].habit_id()));
        assert_eq!(fake.count(&Call::List(MARCH)), 2);
        assert!(!controller.snapshot().creating);
    }

    #[tokio::test]
    async fn test_create_appends_when_refetch_fails() {
        let (fake, controller) = setup(two_habits()).await;
        fake.fail(Call::List(MARCH), RemoteError::Timeout);

        controller.create_habit("Meditate").await.unwrap();
        let records = controller.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].name(), "Meditate");
        assert!(records[2].days().is_empty());
        assert_eq!(controller.last_error(), Some(RemoteError::Timeout));
    }

    #[tokio::test]
    async fn test_concurrent_create_conflicts() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Create);

        let first = controller.create_habit("Read more");
        tokio::pin!(first);
        run_until_parked(first.as_mut()).await;
        assert!(controller.snapshot().creating);

        let err = controller.create_habit("Another").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(ConflictError::CreateInProgress)));

        release.send(()).unwrap();
        first.await.unwrap();
        assert_eq!(fake.count(&Call::Create), 1);
        assert!(!controller.snapshot().creating);
    }

    #[tokio::test]
    async fn test_rejected_create_leaves_records() {
        let fake = FakeGateway {
            reject_create: true,
            ..two_habits()
        };
        let (_fake, controller) = setup(fake).await;
        let before = controller.records();

        let err = controller.create_habit("Read").await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Rejected(_))));
        assert_eq!(controller.records(), before);
        assert!(!controller.snapshot().creating);
    }

    #[tokio::test]
    async fn test_cancelled_delete_sends_nothing() {
        let (fake, controller) = setup(two_habits()).await;
        let calls = fake.total_calls();
        let before = controller.records();

        controller.request_delete(&id("7")).unwrap();
        assert_eq!(controller.snapshot().staged_delete, Some(id("7")));
        controller.cancel_delete();

        assert_eq!(controller.records(), before);
        assert_eq!(fake.total_calls(), calls);
        let err = controller.confirm_delete().await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::NothingStaged)));
    }

    #[tokio::test]
    async fn test_delete_waits_for_server() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::Delete(id("7")));
        controller.request_delete(&id("7")).unwrap();

        let delete = controller.confirm_delete();
        tokio::pin!(delete);
        run_until_parked(delete.as_mut()).await;
        assert_eq!(controller.records().len(), 2);

        release.send(()).unwrap();
        assert_eq!(delete.await.unwrap(), id("7"));
        let records = controller.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].habit_id(), &id("8"));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let (fake, controller) = setup(two_habits()).await;
        fake.fail(Call::Delete(id("7")), RemoteError::Transport("offline".to_string()));

        controller.request_delete(&id("7")).unwrap();
        assert!(controller.confirm_delete().await.is_err());
        assert_eq!(controller.records().len(), 2);
        assert!(controller.snapshot().staged_delete.is_none());
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn test_request_delete_unknown_habit() {
        let (_fake, controller) = setup(two_habits()).await;
        let err = controller.request_delete(&id("nope")).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownHabit(_))));
        assert!(controller.snapshot().staged_delete.is_none());
    }

    #[tokio::test]
    async fn test_rename_success_clears_stage() {
        let (_fake, controller) = setup(two_habits()).await;
        let draft = controller.request_rename(&id("8")).unwrap();
        assert_eq!(draft.current_name, "Run");

        assert_eq!(controller.confirm_rename("  Sprint ").await.unwrap(), "Sprint");
        assert_eq!(controller.records()[1].name(), "Sprint");
        assert!(controller.snapshot().staged_rename.is_none());
    }

    #[tokio::test]
    async fn test_rename_failure_keeps_stage_for_retry() {
        let (fake, controller) = setup(two_habits()).await;
        controller.request_rename(&id("8")).unwrap();

        let err = controller.confirm_rename("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyName)));
        assert!(controller.snapshot().staged_rename.is_some());
        assert_eq!(fake.count(&Call::Rename(id("8"))), 0);

        fake.fail(Call::Rename(id("8")), RemoteError::Timeout);
        assert!(controller.confirm_rename("Sprint").await.is_err());
        assert_eq!(controller.records()[1].name(), "Run");
        assert!(controller.snapshot().staged_rename.is_some());

        controller.confirm_rename("Sprint").await.unwrap();
        assert_eq!(controller.records()[1].name(), "Sprint");

        controller.request_rename(&id("7")).unwrap();
        controller.cancel_rename();
        assert!(controller.snapshot().staged_rename.is_none());
    }

    #[tokio::test]
    async fn test_start_failure_still_loads_month() {
        let fake = Arc::new(two_habits());
        fake.fail(Call::Start, RemoteError::Timeout);
        let controller = HabitsMonthController::new(fake.clone(), DateWindow::new(today()));

        assert_eq!(
            controller.initialize().await.unwrap(),
            LoadOutcome::Applied(2)
        );
        assert_eq!(controller.records().len(), 2);
        assert!(controller.can_navigate_backward());
        assert_eq!(controller.snapshot().window.earliest, None);
        assert_eq!(controller.last_error(), Some(RemoteError::Timeout));
    }

    #[tokio::test]
    async fn test_month_load_failure_is_returned_by_initialize() {
        let fake = Arc::new(two_habits());
        fake.fail(Call::List(MARCH), RemoteError::Unauthorized);
        let controller = HabitsMonthController::new(fake.clone(), DateWindow::new(today()));

        let err = controller.initialize().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(controller.snapshot().window.earliest, Some(YearMonth::new(1, 2024)));
    }

    #[tokio::test]
    async fn test_older_request_for_reselected_month_is_discarded() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::List(MARCH));

        let first = controller.load_month(3, 2024);
        tokio::pin!(first);
        run_until_parked(first.as_mut()).await;

        fake.mark_done("7", MARCH, 15);
        controller.load_month(4, 2024).await.unwrap();
        assert_eq!(
            controller.load_month(3, 2024).await.unwrap(),
            LoadOutcome::Applied(2)
        );
        assert!(controller.records()[0].is_completed(15));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), LoadOutcome::Discarded);
        assert!(controller.records()[0].is_completed(15));
        assert!(!controller.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_older_failure_for_reselected_month_is_silent() {
        let (fake, controller) = setup(two_habits()).await;
        let release = fake.gate(Call::List(MARCH));
        fake.fail(Call::List(MARCH), RemoteError::Timeout);

        let first = controller.load_month(3, 2024);
        tokio::pin!(first);
        run_until_parked(first.as_mut()).await;
        // Only the parked call fails.
        controller.load_month(4, 2024).await.unwrap();
        controller.load_month(3, 2024).await.unwrap();

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), LoadOutcome::Discarded);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.records().len(), 2);
    }
}
