//! Cell Store (C5): sparse, versioned, workbook -> sheet -> cell storage.
//!
//! Realized in-process behind a single `RwLock`: no external database
//! dependency is declared, so the "three tables" of the logical
//! persisted-state layout become three nested `HashMap`s whose ownership
//! cascades structurally (dropping a `Workbook` drops its `Sheet`s drops
//! their `Cell`s).

use crate::address::Address;
use crate::error::CoreError;
use crate::model::{Cell, Sheet, Workbook};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct CellStore {
    workbooks: RwLock<HashMap<Uuid, Workbook>>,
}

impl CellStore {
    pub fn new() -> Self {
        CellStore {
            workbooks: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_workbook(&self, name: String) -> Uuid {
        let id = Uuid::new_v4();
        let workbook = Workbook::new(id, name);
        self.workbooks.write().unwrap().insert(id, workbook);
        id
    }

    pub fn create_sheet(
        &self,
        workbook_id: Uuid,
        name: String,
        row_count: u32,
        column_count: u32,
    ) -> Result<Uuid, CoreError> {
        let mut workbooks = self.workbooks.write().unwrap();
        let workbook = workbooks
            .get_mut(&workbook_id)
            .ok_or_else(|| CoreError::NotFound(format!("workbook {workbook_id}")))?;
        let id = Uuid::new_v4();
        workbook
            .sheets
            .insert(id, Sheet::new(id, name, row_count, column_count));
        workbook.version += 1;
        Ok(id)
    }

    /// Look up which workbook owns a sheet, then run `f` against it with
    /// the workbooks table held for reading.
    fn with_sheet<R>(
        &self,
        sheet_id: Uuid,
        f: impl FnOnce(&Sheet) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let workbooks = self.workbooks.read().unwrap();
        let sheet = workbooks
            .values()
            .find_map(|wb| wb.sheets.get(&sheet_id))
            .ok_or_else(|| CoreError::NotFound(format!("sheet {sheet_id}")))?;
        f(sheet)
    }

    fn with_sheet_mut<R>(
        &self,
        sheet_id: Uuid,
        f: impl FnOnce(&mut Sheet) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut workbooks = self.workbooks.write().unwrap();
        let sheet = workbooks
            .values_mut()
            .find_map(|wb| wb.sheets.get_mut(&sheet_id))
            .ok_or_else(|| CoreError::NotFound(format!("sheet {sheet_id}")))?;
        f(sheet)
    }

    pub fn sheet_bounds(&self, sheet_id: Uuid) -> Result<(u32, u32), CoreError> {
        self.with_sheet(sheet_id, |sheet| Ok((sheet.row_count, sheet.column_count)))
    }

    pub fn get(&self, sheet_id: Uuid, addr: Address) -> Result<Option<Cell>, CoreError> {
        self.with_sheet(sheet_id, |sheet| {
            Ok(sheet.cells.get(&(addr.row, addr.col)).cloned())
        })
    }

    pub fn list(&self, sheet_id: Uuid) -> Result<Vec<Cell>, CoreError> {
        self.with_sheet(sheet_id, |sheet| Ok(sheet.cells.values().cloned().collect()))
    }

    pub fn list_formulas(&self, sheet_id: Uuid) -> Result<Vec<Cell>, CoreError> {
        self.with_sheet(sheet_id, |sheet| {
            Ok(sheet
                .cells
                .values()
                .filter(|c| c.is_formula())
                .cloned()
                .collect())
        })
    }

    /// Create or overwrite a cell. `expected_version` must match the
    /// currently-stored version (or there must be no stored cell when
    /// `expected_version` is `None`); on mismatch, fails with
    /// [`CoreError::VersionConflict`]. On success the stored version
    /// becomes one past the higher of `expected_version` and the
    /// coordinate's retained high-water mark, so a cell that was cleared
    /// and re-materialized never reuses a version a client already
    /// observed (§3, "versions are never recycled").
    pub fn upsert(
        &self,
        sheet_id: Uuid,
        mut cell: Cell,
        expected_version: Option<u64>,
    ) -> Result<Cell, CoreError> {
        self.with_sheet_mut(sheet_id, |sheet| {
            let key = (cell.addr.row, cell.addr.col);
            let current = sheet.cells.get(&key).map(|c| c.version);
            if current != expected_version {
                return Err(CoreError::VersionConflict(cell.addr));
            }
            let base = current
                .or_else(|| sheet.version_high_water.get(&key).copied())
                .unwrap_or(0);
            cell.version = base + 1;
            cell.updated_at_ms = crate::model::now_ms();
            sheet.version_high_water.insert(key, cell.version);
            sheet.cells.insert(key, cell.clone());
            Ok(cell)
        })
    }

    /// Delete a cell, subject to the same optimistic check as `upsert`
    /// when `expected_version` is supplied. No-op (returns `Ok(None)`) if
    /// the cell is already absent. The coordinate's version high-water
    /// mark is left untouched so a later re-materialization continues
    /// counting up from it rather than restarting at 1.
    pub fn delete(
        &self,
        sheet_id: Uuid,
        addr: Address,
        expected_version: Option<u64>,
    ) -> Result<Option<Cell>, CoreError> {
        self.with_sheet_mut(sheet_id, |sheet| {
            let key = (addr.row, addr.col);
            match sheet.cells.get(&key) {
                None => Ok(None),
                Some(existing) => {
                    if let Some(expected) = expected_version {
                        if existing.version != expected {
                            return Err(CoreError::VersionConflict(addr));
                        }
                    }
                    Ok(sheet.cells.remove(&key))
                }
            }
        })
    }
}
