//! The data model of §3: workbooks own sheets own cells, cascading on delete.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const DEFAULT_ROW_COUNT: u32 = 1000;
pub const DEFAULT_COLUMN_COUNT: u32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellKind {
    Text,
    Number,
    Formula,
    Boolean,
    Error,
}

/// A materialized cell. Absent cells are never represented: clearing a cell
/// deletes its row (spec invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub addr: Address,
    pub kind: CellKind,
    pub raw: String,
    pub computed: String,
    pub version: u64,
    pub updated_at_ms: u64,
}

impl Cell {
    pub fn new(addr: Address, kind: CellKind, raw: String, computed: String, version: u64) -> Self {
        Cell {
            addr,
            kind,
            raw,
            computed,
            version,
            updated_at_ms: now_ms(),
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.kind, CellKind::Formula)
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The external, wire-facing view of a cell (§6 `CellView`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellView {
    pub row: u32,
    pub col: u32,
    pub addr: String,
    pub kind: CellKind,
    pub raw: String,
    pub computed: String,
    pub version: u64,
    pub updated_at_ms: u64,
}

impl From<&Cell> for CellView {
    fn from(cell: &Cell) -> Self {
        CellView {
            row: cell.addr.row,
            col: cell.addr.col,
            addr: cell.addr.encode(),
            kind: cell.kind,
            raw: cell.raw.clone(),
            computed: cell.computed.clone(),
            version: cell.version,
            updated_at_ms: cell.updated_at_ms,
        }
    }
}

/// A namespace of cells with fixed bounds. Sparse: only non-empty cells exist.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub id: Uuid,
    pub name: String,
    pub row_count: u32,
    pub column_count: u32,
    pub cells: HashMap<(u32, u32), Cell>,
    /// Highest version ever committed at each coordinate, retained after a
    /// cell is cleared so a later re-materialization can't recycle a
    /// version a client already observed (§3, "versions are never
    /// recycled").
    pub version_high_water: HashMap<(u32, u32), u64>,
}

impl Sheet {
    pub fn new(id: Uuid, name: String, row_count: u32, column_count: u32) -> Self {
        Sheet {
            id,
            name,
            row_count,
            column_count,
            cells: HashMap::new(),
            version_high_water: HashMap::new(),
        }
    }

    pub fn in_bounds(&self, addr: Address) -> bool {
        addr.row >= 1 && addr.row <= self.row_count && addr.col < self.column_count
    }
}

/// A named collection of sheets with its own version counter.
#[derive(Debug, Clone)]
pub struct Workbook {
    pub id: Uuid,
    pub name: String,
    pub version: u64,
    pub sheets: HashMap<Uuid, Sheet>,
}

impl Workbook {
    pub fn new(id: Uuid, name: String) -> Self {
        Workbook {
            id,
            name,
            version: 0,
            sheets: HashMap::new(),
        }
    }
}
