use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sqlite_bridge::prelude::*;

use crate::model::{ConnModel, Op, StmtKind, TaskState, expected_window};

const MAX_STALE_HANDLES: usize = 16;

/// Expected, non-fatal outcomes of a step.
#[derive(Debug, Clone)]
pub(crate) enum SimError {
    Cancelled,
    InvalidHandle,
}

#[derive(Debug, Clone)]
pub(crate) struct StepOutcome {
    pub(crate) result: Result<(), SimError>,
    pub(crate) conn_id: Option<ConnectionId>,
}

impl StepOutcome {
    fn ok(conn_id: Option<ConnectionId>) -> Self {
        Self {
            result: Ok(()),
            conn_id,
        }
    }

    fn err(err: SimError, conn_id: Option<ConnectionId>) -> Self {
        Self {
            result: Err(err),
            conn_id,
        }
    }
}

/// Applies model operations to a live registry. A returned `Err` is a bridge bug.
pub(crate) struct BackendShim {
    pub(crate) registry: HandleRegistry,
}

impl BackendShim {
    pub(crate) fn new() -> Result<Self, String> {
        let registry = HandleRegistry::new(RegistryOptions::default())
            .map_err(|err| format!("registry init failed: {err}"))?;
        Ok(Self { registry })
    }

    pub(crate) fn apply(
        &mut self,
        task: &mut TaskState,
        op: Op,
        rng: &mut ChaCha8Rng,
    ) -> Result<StepOutcome, String> {
        let conn_id = task.conn.as_ref().map(|conn| conn.id);
        match op {
            Op::Sleep(_) => Ok(StepOutcome::ok(conn_id)),
            Op::Open => self.open(task),
            Op::Close => self.close(task),
            Op::Prepare(kind) => self.prepare(task, kind),
            Op::Finalize => self.finalize(task, rng),
            Op::Run => self.run(task, rng),
            Op::Cancel => self.cancel(task),
            Op::ResetCancel(cancelable) => self.reset_cancel(task, cancelable),
            Op::UseStale => self.use_stale(task, rng),
        }
    }

    fn open(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        if task.conn.is_some() {
            return Err(format!("task {} opened a second connection", task.id));
        }
        let label = format!("sim-task-{}", task.id);
        let id = self
            .registry
            .open(":memory:", OpenFlags::CREATE_IF_NECESSARY, &label, false, false)
            .map_err(|err| format!("open failed: {err}"))?;
        let create = self
            .registry
            .prepare(id, "CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .map_err(|err| format!("prepare create failed: {err}"))?;
        self.registry
            .execute(id, create)
            .map_err(|err| format!("create table failed: {err}"))?;
        self.registry
            .finalize(id, create)
            .map_err(|err| format!("finalize create failed: {err}"))?;
        task.conn = Some(ConnModel::new(id));
        Ok(StepOutcome::ok(Some(id)))
    }

    fn close(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        let conn = task
            .conn
            .take()
            .ok_or_else(|| format!("task {} closed without a connection", task.id))?;
        self.registry
            .close(conn.id)
            .map_err(|err| format!("close of {} failed: {err}", conn.id))?;
        remember_stale(task, conn.id, None);
        for (stmt, _) in conn.statements {
            remember_stale(task, conn.id, Some(stmt));
        }
        Ok(StepOutcome::ok(Some(conn.id)))
    }

    fn prepare(&mut self, task: &mut TaskState, kind: StmtKind) -> Result<StepOutcome, String> {
        let conn = connection(task)?;
        let result = self.registry.prepare(conn.id, kind.sql());
        match classify(result, conn)? {
            Ok(stmt) => {
                conn.statements.push((stmt, kind));
                Ok(StepOutcome::ok(Some(conn.id)))
            }
            Err(err) => Ok(StepOutcome::err(err, Some(conn.id))),
        }
    }

    fn finalize(&mut self, task: &mut TaskState, rng: &mut ChaCha8Rng) -> Result<StepOutcome, String> {
        let conn = connection(task)?;
        if conn.statements.is_empty() {
            return Err(format!("finalize on {} without statements", conn.id));
        }
        let idx = rng.random_range(0..conn.statements.len());
        let (stmt, _) = conn.statements.swap_remove(idx);
        let conn_id = conn.id;
        self.registry
            .finalize(conn_id, stmt)
            .map_err(|err| format!("finalize of {stmt} failed: {err}"))?;
        remember_stale(task, conn_id, Some(stmt));
        Ok(StepOutcome::ok(Some(conn_id)))
    }

    fn run(&mut self, task: &mut TaskState, rng: &mut ChaCha8Rng) -> Result<StepOutcome, String> {
        let conn = connection(task)?;
        if conn.statements.is_empty() {
            return Err(format!("run on {} without statements", conn.id));
        }
        let (stmt, kind) = conn.statements[rng.random_range(0..conn.statements.len())];
        let registry = &self.registry;
        let id = conn.id;

        let outcome = match kind {
            StmtKind::Insert => {
                registry
                    .bind_string(id, stmt, 1, &format!("row-{}", conn.rows + 1))
                    .map_err(|err| format!("bind failed: {err}"))?;
                let changed = classify(registry.execute_for_changed_row_count(id, stmt), conn)?;
                changed.map(|changed| {
                    if changed == 1 {
                        conn.rows += 1;
                        Ok(())
                    } else {
                        Err(format!("insert on {id} changed {changed} rows"))
                    }
                })
            }
            StmtKind::Count => {
                let count = classify(registry.execute_for_long(id, stmt), conn)?;
                count.map(|count| {
                    if count == conn.rows {
                        Ok(())
                    } else {
                        Err(format!("count on {id} was {count}, model has {}", conn.rows))
                    }
                })
            }
            StmtKind::Window => {
                let max_rows = rng.random_range(1..=8_usize);
                let start = rng.random_range(0..=conn.rows + 2);
                let count_all = rng.random_bool(0.3);
                let mut window = RowWindow::new(usize::MAX).with_max_rows(max_rows);
                let start_pos = usize::try_from(start).map_err(|err| err.to_string())?;
                let fill = classify(
                    registry.execute_for_cursor_window(id, stmt, &mut window, start_pos, start_pos, count_all),
                    conn,
                )?;
                fill.map(|fill| check_window(&fill, &window, conn.rows, start, max_rows, count_all))
            }
            StmtKind::Array => {
                let array = classify(registry.execute_for_object_array(id, stmt), conn)?;
                array.map(|array| {
                    let rows = i64::try_from(array.rows.len()).unwrap_or(i64::MAX);
                    if rows != conn.rows {
                        Err(format!("object array on {id} had {rows} rows, model has {}", conn.rows))
                    } else if array.columns != ["id", "label"] {
                        Err(format!("object array on {id} had columns {:?}", array.columns))
                    } else {
                        Ok(())
                    }
                })
            }
        };

        match outcome {
            Ok(check) => check.map(|()| StepOutcome::ok(Some(id))),
            Err(err) => Ok(StepOutcome::err(err, Some(id))),
        }
    }

    fn cancel(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        let conn = connection(task)?;
        self.registry.cancel(conn.id);
        conn.cancel_raised = true;
        Ok(StepOutcome::ok(Some(conn.id)))
    }

    fn reset_cancel(&mut self, task: &mut TaskState, cancelable: bool) -> Result<StepOutcome, String> {
        let conn = connection(task)?;
        self.registry
            .reset_cancel(conn.id, cancelable)
            .map_err(|err| format!("reset_cancel on {} failed: {err}", conn.id))?;
        conn.cancel_raised = false;
        conn.cancelable = cancelable;
        Ok(StepOutcome::ok(Some(conn.id)))
    }

    fn use_stale(&mut self, task: &mut TaskState, rng: &mut ChaCha8Rng) -> Result<StepOutcome, String> {
        if task.stale.is_empty() {
            return Err(format!("task {} has no stale handles", task.id));
        }
        let (conn_id, stmt) = task.stale[rng.random_range(0..task.stale.len())];
        let result = match stmt {
            Some(stmt) => self.registry.execute(conn_id, stmt),
            None => self.registry.reset_cancel(conn_id, false),
        };
        match result {
            Err(BridgeError::InvalidHandle(_)) => {
                Ok(StepOutcome::err(SimError::InvalidHandle, Some(conn_id)))
            }
            Ok(()) => Err(format!("stale handle {conn_id}/{stmt:?} was accepted")),
            Err(err) => Err(format!("stale handle {conn_id}/{stmt:?} gave {err}")),
        }
    }
}

fn connection(task: &mut TaskState) -> Result<&mut ConnModel, String> {
    let task_id = task.id;
    task.conn
        .as_mut()
        .ok_or_else(|| format!("task {task_id} has no connection"))
}

fn remember_stale(task: &mut TaskState, conn: ConnectionId, stmt: Option<StatementId>) {
    if task.stale.len() >= MAX_STALE_HANDLES {
        task.stale.remove(0);
    }
    task.stale.push((conn, stmt));
}

/// Split a bridge result into success, a cancellation the model allows, or a bug.
fn classify<T>(result: Result<T, BridgeError>, conn: &ConnModel) -> Result<Result<T, SimError>, String> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(BridgeError::Cancelled(_)) if conn.may_cancel() => Ok(Err(SimError::Cancelled)),
        Err(err) => Err(format!(
            "unexpected error on {} (cancel_raised={}, cancelable={}): {err}",
            conn.id, conn.cancel_raised, conn.cancelable
        )),
    }
}

fn check_window(
    fill: &WindowFill,
    window: &RowWindow,
    rows: i64,
    start: i64,
    max_rows: usize,
    count_all: bool,
) -> Result<(), String> {
    let max_rows = i64::try_from(max_rows).unwrap_or(i64::MAX);
    let (want_start, want_count, want_copied) = expected_window(rows, start, max_rows, count_all);
    let got_copied = i64::try_from(window.num_rows()).unwrap_or(i64::MAX);
    if (i64::from(fill.start_pos), i64::from(fill.row_count), got_copied)
        != (want_start, want_count, want_copied)
    {
        return Err(format!(
            "window over {rows} rows from {start} (max {max_rows}, count_all={count_all}) \
             gave start={} count={} copied={got_copied}, want ({want_start}, {want_count}, {want_copied})",
            fill.start_pos, fill.row_count
        ));
    }
    if want_copied > 0 && window.get(0, 0) != Some(&SqlValue::Integer(start + 1)) {
        return Err(format!(
            "window from {start} begins with {:?}",
            window.get(0, 0)
        ));
    }
    Ok(())
}
