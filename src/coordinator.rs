//! Update Coordinator (C6): one edit = validate -> cycle-check -> write ->
//! recompute dependents -> commit, with bounded optimistic-version retry
//! (§5).

use crate::address::Address;
use crate::error::{CoreError, CoreResult};
use crate::eval;
use crate::events::{CellChanged, ChangeNotifier};
use crate::formula;
use crate::graph::DependencyGraph;
use crate::model::{Cell, CellKind, CellView};
use crate::store::CellStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Retry envelope from §5: up to 3 retries after the initial attempt,
/// backing off 100ms, 200ms, 400ms between them.
const MAX_RETRIES: usize = 3;
const BACKOFF_MS: [u64; MAX_RETRIES] = [100, 200, 400];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

pub struct Coordinator {
    store: Arc<CellStore>,
    notifier: ChangeNotifier,
}

impl Coordinator {
    pub fn new(store: Arc<CellStore>, notifier: ChangeNotifier) -> Self {
        Coordinator { store, notifier }
    }

    /// Run one edit end to end, retrying on `VERSION_CONFLICT` per the
    /// bounded envelope of §5. Returns `Ok(None)` when the edit cleared an
    /// existing cell (or cleared nothing). Never cancellable; see
    /// [`Coordinator::update_cancellable`] for a variant that honors a
    /// [`CancellationToken`] during the retry backoff.
    #[instrument(skip(self, req), fields(sheet = %sheet_id))]
    pub async fn update(&self, sheet_id: Uuid, req: UpdateRequest) -> CoreResult<Option<CellView>> {
        self.update_cancellable(sheet_id, req, &CancellationToken::new())
            .await
    }

    /// Same protocol as [`Coordinator::update`], but a cancellation
    /// requested while the coordinator is sleeping between retries (§5,
    /// "Suspension points") aborts promptly with [`CoreError::Cancelled`]
    /// instead of continuing to retry. Cancellation of an in-flight
    /// transaction is not observed here — `try_update_once` itself runs to
    /// completion, matching "best-effort" in §5.
    pub async fn update_cancellable(
        &self,
        sheet_id: Uuid,
        req: UpdateRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<CellView>> {
        let mut retries = 0;
        loop {
            match self.try_update_once(sheet_id, &req) {
                Ok(outcome) => return Ok(outcome),
                Err(CoreError::VersionConflict(addr)) => {
                    if retries >= MAX_RETRIES {
                        return Err(CoreError::VersionConflict(addr));
                    }
                    let delay = Duration::from_millis(BACKOFF_MS[retries]);
                    warn!(%addr, retries, "version conflict, retrying after backoff");
                    retries += 1;
                    backoff_or_cancel(delay, cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a sequence of edits. Per-cell failures are logged and do not
    /// abort the batch; the response contains only cells that were
    /// successfully updated.
    pub async fn batch_update(&self, sheet_id: Uuid, requests: Vec<UpdateRequest>) -> Vec<CellView> {
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            match self.update(sheet_id, req).await {
                Ok(Some(view)) => results.push(view),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "batch update: cell failed, continuing"),
            }
        }
        results
    }

    /// One attempt at steps 2-8 of §4.6. Step 1 (sheet existence) is
    /// folded into the bounds lookup below.
    fn try_update_once(&self, sheet_id: Uuid, req: &UpdateRequest) -> CoreResult<Option<CellView>> {
        let (row_count, column_count) = self.store.sheet_bounds(sheet_id)?;
        let addr = Address::new(req.row, req.col);
        if req.row < 1 || req.row > row_count || req.col >= column_count {
            return Err(CoreError::OutOfBounds(addr.encode()));
        }

        let value = req.value.trim();

        if value.is_empty() {
            return self.clear(sheet_id, addr);
        }

        let prior = self.store.get(sheet_id, addr)?;
        let prior_version = prior.as_ref().map(|c| c.version);

        let (kind, computed) = if formula::is_formula(value) {
            formula::validate(value)?;
            let all_cells = self.store.list(sheet_id)?;
            let graph = DependencyGraph::build(&all_cells)?;
            let new_deps = formula::extract_refs(value)?;
            if graph.would_create_cycle(addr, &new_deps) {
                return Err(CoreError::Cycle(addr));
            }
            let values = values_map(&all_cells);
            (CellKind::Formula, eval::evaluate(value, &values))
        } else if value.parse::<f64>().is_ok() {
            (CellKind::Number, value.to_string())
        } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            (CellKind::Boolean, value.to_lowercase())
        } else {
            (CellKind::Text, value.to_string())
        };

        let cell = Cell::new(addr, kind, value.to_string(), computed, 0);
        let stored = self.store.upsert(sheet_id, cell, prior_version)?;

        self.notifier.publish(CellChanged {
            sheet_id,
            addr: addr.encode(),
            version: stored.version,
            kind: stored.kind,
            computed: stored.computed.clone(),
        });

        self.recompute_dependents(sheet_id, addr)?;

        Ok(Some(CellView::from(&stored)))
    }

    fn clear(&self, sheet_id: Uuid, addr: Address) -> CoreResult<Option<CellView>> {
        let Some(existing) = self.store.get(sheet_id, addr)? else {
            return Ok(None);
        };
        self.store.delete(sheet_id, addr, Some(existing.version))?;
        self.notifier.publish(CellChanged {
            sheet_id,
            addr: addr.encode(),
            version: existing.version,
            kind: existing.kind,
            computed: String::new(),
        });
        self.recompute_dependents(sheet_id, addr)?;
        Ok(None)
    }

    /// Step 7: recompute every transitive dependent of `addr`, in
    /// dependency order, from a fresh snapshot. A cycle discovered here
    /// indicates stale state (step 5's cycle check was supposed to
    /// prevent it) — it is logged and abandons further recomputation for
    /// this edit rather than failing the already-committed primary write.
    fn recompute_dependents(&self, sheet_id: Uuid, addr: Address) -> CoreResult<()> {
        let all_cells = self.store.list(sheet_id)?;
        let graph = match DependencyGraph::build(&all_cells) {
            Ok(g) => g,
            Err(CoreError::Cycle(bad)) => {
                warn!(%bad, "cycle found while rebuilding graph for recompute, abandoning");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let dependents = graph.transitive_dependents(addr);
        if dependents.is_empty() {
            return Ok(());
        }

        let order = match graph.topo_sort() {
            Ok(order) => order,
            Err(CoreError::Cycle(bad)) => {
                warn!(%bad, "cycle found during recompute, abandoning further recomputation");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut values = values_map(&all_cells);
        let mut by_addr: HashMap<Address, Cell> =
            all_cells.into_iter().map(|c| (c.addr, c)).collect();

        for dep_addr in order {
            if !dependents.contains(&dep_addr) {
                continue;
            }
            let existing = match by_addr.get(&dep_addr) {
                Some(c) => c.clone(),
                None => continue,
            };
            if !existing.is_formula() {
                continue;
            }

            let computed = eval::evaluate(&existing.raw, &values);
            if computed == existing.computed {
                values.insert(dep_addr, computed);
                continue;
            }

            let updated = Cell::new(
                dep_addr,
                CellKind::Formula,
                existing.raw.clone(),
                computed,
                0,
            );
            match self.store.upsert(sheet_id, updated, Some(existing.version)) {
                Ok(stored) => {
                    values.insert(dep_addr, stored.computed.clone());
                    self.notifier.publish(CellChanged {
                        sheet_id,
                        addr: dep_addr.encode(),
                        version: stored.version,
                        kind: stored.kind,
                        computed: stored.computed.clone(),
                    });
                    by_addr.insert(dep_addr, stored);
                }
                Err(CoreError::VersionConflict(bad)) => {
                    warn!(%bad, "dependent changed concurrently, abandoning further recomputation for this edit");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

fn values_map(cells: &[Cell]) -> HashMap<Address, String> {
    cells.iter().map(|c| (c.addr, c.computed.clone())).collect()
}

/// Sleep for `delay`, or return [`CoreError::Cancelled`] promptly if
/// `cancel` fires first (§5, "Cancellation requested during backoff must
/// abort promptly").
async fn backoff_or_cancel(delay: Duration, cancel: &CancellationToken) -> CoreResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CellStore;

    fn new_coordinator() -> (Coordinator, Uuid) {
        let store = Arc::new(CellStore::new());
        let wb = store.create_workbook("wb".to_string());
        let sheet = store.create_sheet(wb, "Sheet1".to_string(), 1000, 26).unwrap();
        (Coordinator::new(store, ChangeNotifier::new(64)), sheet)
    }

    fn req(row: u32, col: u32, value: &str) -> UpdateRequest {
        UpdateRequest {
            row,
            col,
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn s1_simple_formula() {
        let (coord, sheet) = new_coordinator();
        coord.update(sheet, req(1, 0, "10")).await.unwrap();
        coord.update(sheet, req(2, 0, "20")).await.unwrap();
        let view = coord
            .update(sheet, req(3, 0, "=A1+A2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.computed, "30");
        assert!(matches!(view.kind, CellKind::Formula));
    }

    #[tokio::test]
    async fn s2_range_aggregate() {
        let (coord, sheet) = new_coordinator();
        coord.update(sheet, req(1, 0, "10")).await.unwrap();
        coord.update(sheet, req(2, 0, "20")).await.unwrap();
        coord.update(sheet, req(3, 0, "30")).await.unwrap();
        let view = coord
            .update(sheet, req(5, 0, "=SUM(A1:A3)+5"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.computed, "65");
    }

    #[tokio::test]
    async fn s3_cascade_reevaluation() {
        let (coord, sheet) = new_coordinator();
        coord.update(sheet, req(1, 0, "10")).await.unwrap();
        coord.update(sheet, req(2, 0, "20")).await.unwrap();
        coord.update(sheet, req(3, 0, "=A1+A2")).await.unwrap();
        coord.update(sheet, req(1, 0, "100")).await.unwrap();
        let view = coord.update(sheet, req(3, 0, "=A1+A2")).await;
        // A3 wasn't resubmitted; fetch its current state through the store.
        let _ = view;
        let a3 = coord.store.get(sheet, Address::new(3, 0)).unwrap().unwrap();
        assert_eq!(a3.computed, "120");
    }

    #[tokio::test]
    async fn s4_cycle_rejected() {
        let (coord, sheet) = new_coordinator();
        coord.update(sheet, req(1, 0, "=A2")).await.unwrap();
        let err = coord.update(sheet, req(2, 0, "=A1")).await.unwrap_err();
        assert!(matches!(err, CoreError::Cycle(_)));
        assert!(coord.store.get(sheet, Address::new(2, 0)).unwrap().is_none());
    }

    #[tokio::test]
    async fn s5_division_by_zero() {
        let (coord, sheet) = new_coordinator();
        let view = coord
            .update(sheet, req(1, 0, "=10/0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.computed, "#DIV/0!");
        assert!(matches!(view.kind, CellKind::Formula));
    }

    #[tokio::test]
    async fn clearing_deletes_row_and_recomputes_dependents() {
        let (coord, sheet) = new_coordinator();
        coord.update(sheet, req(1, 0, "10")).await.unwrap();
        coord.update(sheet, req(2, 0, "=A1+5")).await.unwrap();
        coord.update(sheet, req(1, 0, "")).await.unwrap();
        assert!(coord.store.get(sheet, Address::new(1, 0)).unwrap().is_none());
        let a2 = coord.store.get(sheet, Address::new(2, 0)).unwrap().unwrap();
        assert_eq!(a2.computed, "5");
    }

    #[tokio::test]
    async fn out_of_bounds_is_rejected() {
        let (coord, sheet) = new_coordinator();
        let err = coord.update(sheet, req(0, 0, "10")).await.unwrap_err();
        assert!(matches!(err, CoreError::OutOfBounds(_)));
    }

    #[tokio::test]
    async fn update_cancellable_matches_update_when_not_cancelled() {
        let (coord, sheet) = new_coordinator();
        let cancel = CancellationToken::new();
        let view = coord
            .update_cancellable(sheet, req(1, 0, "2"), &cancel)
            .await
            .unwrap();
        assert_eq!(view.unwrap().computed, "2");
    }

    #[tokio::test]
    async fn backoff_or_cancel_returns_cancelled_promptly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        // A long delay would normally make this sleep for a full second;
        // an already-cancelled token must win immediately instead.
        let result = backoff_or_cancel(Duration::from_secs(1), &cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn backoff_or_cancel_sleeps_out_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let result = backoff_or_cancel(Duration::from_millis(1), &cancel).await;
        assert!(result.is_ok());
    }
}
