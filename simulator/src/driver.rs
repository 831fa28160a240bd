use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::args::SimConfig;
use crate::backend::BackendShim;
use crate::logging::EventLog;
use crate::model::{Op, StmtKind, TaskState};
use crate::oracle::Oracle;
use crate::scheduler::Scheduler;

pub(crate) fn run(config: &SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    let mut backend = BackendShim::new()?;
    let mut tasks: Vec<TaskState> = (0..config.tasks).map(TaskState::new).collect();
    let mut scheduler = Scheduler::new(config.tasks);
    let mut events = EventLog::new(config.first_steps, config.tail_steps);

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let max_time = config.duration_ms.unwrap_or(u64::MAX);

    let mut step: u64 = 0;
    let mut cancelled: u64 = 0;
    while step < max_steps && scheduler.clock.now_ms <= max_time {
        let Some(task_id) = scheduler.next_ready(rng) else {
            break;
        };
        let op = next_op(&tasks[task_id], config, rng);
        let op_display = format_op(&op);

        let step_outcome = match backend.apply(&mut tasks[task_id], op.clone(), rng) {
            Ok(outcome) => outcome,
            Err(reason) => {
                events.record(format!("step={step} task={task_id} op={op_display} FAILED"));
                events.dump_failure(&reason);
                return Err(reason);
            }
        };

        if let Op::Sleep(ms) = op {
            scheduler.sleep(task_id, ms);
        } else {
            scheduler.mark_ready(task_id);
        }
        let result_label = match step_outcome.result {
            Ok(()) => "Ok".to_string(),
            Err(ref err) => format!("Err({err:?})"),
        };
        if matches!(step_outcome.result, Err(crate::backend::SimError::Cancelled)) {
            cancelled += 1;
        }
        let conn_label = step_outcome
            .conn_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        events.record(format!(
            "step={} time={}ms task={} op={} conn={} result={}",
            step, scheduler.clock.now_ms, task_id, op_display, conn_label, result_label
        ));

        if let Err(reason) = Oracle::check(&tasks, &backend.registry) {
            events.dump_failure(&reason);
            return Err(reason);
        }
        scheduler.advance_time(1);
        step += 1;
    }

    tracing::info!(
        "complete: steps={} time={}ms tasks={} open_connections={} live_statements={} cancelled={}",
        step,
        scheduler.clock.now_ms,
        config.tasks,
        backend.registry.connection_count(),
        backend.registry.statement_count(),
        cancelled
    );
    Ok(())
}

fn next_op(task: &TaskState, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random::<f64>() < config.sleep_rate {
        return Op::Sleep(rng.random_range(1..=50));
    }

    let Some(conn) = &task.conn else {
        if !task.stale.is_empty() && rng.random::<f64>() < config.stale_rate {
            return Op::UseStale;
        }
        return Op::Open;
    };

    let kind = StmtKind::ALL[rng.random_range(0..StmtKind::ALL.len())];
    let mut weights = vec![
        (Op::Close, config.close_rate),
        (Op::Cancel, config.cancel_rate),
        (Op::ResetCancel(rng.random_bool(0.5)), 0.05),
    ];
    if conn.statements.len() < config.max_statements {
        weights.push((Op::Prepare(kind), 0.20));
    }
    if !conn.statements.is_empty() {
        weights.push((Op::Run, 0.55));
        weights.push((Op::Finalize, 0.08));
    }
    if !task.stale.is_empty() {
        weights.push((Op::UseStale, config.stale_rate));
    }
    choose_weighted(&weights, rng)
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items
            .first()
            .map_or(Op::Sleep(1), |(op, _)| op.clone());
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return op.clone();
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| op.clone())
}

fn format_op(op: &Op) -> String {
    match op {
        Op::Sleep(ms) => format!("Sleep({ms}ms)"),
        other => format!("{other:?}"),
    }
}
