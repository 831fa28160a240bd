use sqlite_bridge::{ConnectionId, StatementId};

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Open,
    Close,
    Prepare(StmtKind),
    Finalize,
    Run,
    Cancel,
    ResetCancel(bool),
    UseStale,
    Sleep(u64),
}

/// The fixed statements a task can prepare against its `t` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StmtKind {
    Insert,
    Count,
    Window,
    Array,
}

impl StmtKind {
    pub(crate) const ALL: [StmtKind; 4] = [
        StmtKind::Insert,
        StmtKind::Count,
        StmtKind::Window,
        StmtKind::Array,
    ];

    pub(crate) fn sql(self) -> &'static str {
        match self {
            StmtKind::Insert => "INSERT INTO t (label) VALUES (?1)",
            StmtKind::Count => "SELECT count(*) FROM t",
            StmtKind::Window | StmtKind::Array => "SELECT id, label FROM t ORDER BY id",
        }
    }
}

/// What the registry should hold for one open connection.
#[derive(Debug, Clone)]
pub(crate) struct ConnModel {
    pub(crate) id: ConnectionId,
    pub(crate) rows: i64,
    pub(crate) statements: Vec<(StatementId, StmtKind)>,
    pub(crate) cancel_raised: bool,
    pub(crate) cancelable: bool,
}

impl ConnModel {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self {
            id,
            rows: 0,
            statements: Vec::new(),
            cancel_raised: false,
            cancelable: false,
        }
    }

    /// Whether the next engine call may legitimately come back cancelled.
    pub(crate) fn may_cancel(&self) -> bool {
        self.cancel_raised && self.cancelable
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskState {
    pub(crate) id: usize,
    pub(crate) conn: Option<ConnModel>,
    /// Handles this task owned before closing or finalizing them.
    pub(crate) stale: Vec<(ConnectionId, Option<StatementId>)>,
}

impl TaskState {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            conn: None,
            stale: Vec::new(),
        }
    }
}

/// Window a fill over `rows` rows should report, as `(start, row_count)`, with the
/// number of rows that should land in a window capped at `max_rows`.
pub(crate) fn expected_window(rows: i64, start: i64, max_rows: i64, count_all: bool) -> (i64, i64, i64) {
    if start >= rows {
        return (start, rows, 0);
    }
    let copied = max_rows.min(rows - start);
    let row_count = if count_all { rows } else { start + copied };
    (start, row_count, copied)
}
