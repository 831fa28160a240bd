use std::collections::HashSet;

use sqlite_bridge::HandleRegistry;

use crate::model::TaskState;

pub(crate) struct Oracle;

impl Oracle {
    /// Compare the registry's live handles with what the tasks believe they own.
    pub(crate) fn check(tasks: &[TaskState], registry: &HandleRegistry) -> Result<(), String> {
        let mut conns = HashSet::new();
        let mut statements = HashSet::new();

        for task in tasks {
            let Some(conn) = &task.conn else {
                continue;
            };
            if !conns.insert(conn.id) {
                return Err(format!("connection {} owned by more than one task", conn.id));
            }
            let info = registry
                .connection_info(conn.id)
                .map_err(|err| format!("task {} lost connection {}: {err}", task.id, conn.id))?;
            if info.in_use != 0 {
                return Err(format!(
                    "connection {} still leased {} times between steps",
                    conn.id, info.in_use
                ));
            }
            for (stmt, _) in &conn.statements {
                if !statements.insert(*stmt) {
                    return Err(format!("statement {stmt} handed out twice"));
                }
            }
        }

        for task in tasks {
            for (conn, _) in &task.stale {
                if conns.contains(conn) {
                    continue;
                }
                if registry.connection_info(*conn).is_ok() {
                    return Err(format!("closed connection {conn} still resolves"));
                }
            }
        }

        let live_conns = registry.connection_count();
        if live_conns != conns.len() {
            return Err(format!(
                "registry holds {live_conns} connections, tasks own {}",
                conns.len()
            ));
        }
        let live_statements = registry.statement_count();
        if live_statements != statements.len() {
            return Err(format!(
                "registry holds {live_statements} statements, tasks own {}",
                statements.len()
            ));
        }

        Ok(())
    }
}
