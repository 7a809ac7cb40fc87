#![forbid(unsafe_code)]

//! Row visibility filters and per-row permission checks.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::PermissionCatalog;
use crate::catalog::{GrantChain, SchemaGraph};
use crate::types::{QueryError, Result, TableId};

use super::clause::{SqlClauses, WhereNode};
use super::condition::Fragment;
use super::request::{AccessLevel, CallerIdentity, RowPermissionCheck, SelectColumn};

/// Access-control settings of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    /// Start with a strict policy.
    pub strict: bool,
    /// Identity whose queries are always filtered.
    pub anonymous_user: String,
    /// Zone assumed when a permission check names none.
    pub local_zone: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            strict: false,
            anonymous_user: "anonymous".into(),
            local_zone: "tempZone".into(),
        }
    }
}

/// Engine-wide access policy. Once strict, it stays strict.
#[derive(Debug, Default)]
pub struct AccessPolicy {
    strict: AtomicBool,
}

impl AccessPolicy {
    /// Creates a policy.
    pub fn new(strict: bool) -> Self {
        Self {
            strict: AtomicBool::new(strict),
        }
    }

    /// Requests a policy change and returns the policy in effect afterwards.
    /// Relaxing a strict policy is ignored.
    pub fn configure(&self, strict: bool) -> bool {
        if strict {
            self.strict.store(true, Ordering::SeqCst);
            return true;
        }
        if self.is_strict() {
            warn!("access.policy.relax_ignored");
            return true;
        }
        false
    }

    /// Returns true when row filters apply to every non-administrator.
    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::SeqCst)
    }
}

/// Appends grant-chain filters for every protected table owning a selected
/// column. No-op for local administrators; otherwise applied when `strict` or
/// when the caller is `anonymous_user`.
pub fn inject_row_filter(
    graph: &SchemaGraph,
    selected_tables: &[TableId],
    caller: &CallerIdentity,
    strict: bool,
    anonymous_user: &str,
    clauses: &mut SqlClauses,
) -> Result<usize> {
    if caller.privilege.is_local_admin() {
        return Ok(0);
    }
    if !strict && caller.user != anonymous_user {
        return Ok(0);
    }
    let conventions = graph.conventions();
    let mut added = 0;
    for protected in &conventions.protected_tables {
        let table = graph.table_index_by_name(&protected.table)?;
        if !selected_tables.contains(&table) {
            continue;
        }
        let column = format!("{}.{}", protected.table, protected.id_column);
        clauses.where_nodes.push(WhereNode::Predicate(Fragment {
            sql: grant_subquery(&column, &conventions.grant_chain),
            binds: vec![caller.user.clone(), caller.zone.clone()],
        }));
        added += 1;
    }
    if added > 0 {
        debug!(user = %caller.user, filters = added, "access.row_filter");
    }
    Ok(added)
}

fn grant_subquery(column: &str, chain: &GrantChain) -> String {
    format!(
        "{column} in (select object_id from {access} OA, {group} UG, {user} UM, {token} TM \
         where UM.user_name=? and UM.zone_name=? and UM.user_type_name!='{group_type}' \
         and UM.user_id = UG.user_id and UG.group_user_id = OA.user_id \
         and OA.object_id = {column} and OA.access_type_id >= TM.token_id \
         and TM.token_namespace ='{namespace}' and TM.token_name = '{read}')",
        access = chain.access_table,
        group = chain.group_table,
        user = chain.user_table,
        token = chain.token_table,
        group_type = chain.group_type_name,
        namespace = chain.token_namespace,
        read = chain.read_token,
    )
}

/// Per-row permission check bound to one cursor.
///
/// Rows of one batch usually repeat the same object (one row per replica), so
/// the last decision is cached.
#[derive(Debug, Clone)]
pub struct RowPermissionChecker {
    user: String,
    zone: String,
    level: AccessLevel,
    object_column: usize,
    last: Option<(String, bool)>,
}

impl RowPermissionChecker {
    /// Prepares a checker for the given select list. Returns `None` when the
    /// check names no user. Fails closed when no object id column is selected.
    pub fn new(
        check: &RowPermissionCheck,
        local_zone: &str,
        graph: &SchemaGraph,
        select: &[SelectColumn],
    ) -> Result<Option<Self>> {
        if check.user.is_empty() {
            return Ok(None);
        }
        let object_ids = &graph.conventions().object_id_columns;
        let object_column = select
            .iter()
            .position(|s| !s.aggregate.is_aggregate() && object_ids.contains(&s.column))
            .ok_or_else(|| {
                QueryError::denied("permission check requires an object id column in the select list")
            })?;
        let zone = if check.zone.is_empty() {
            local_zone.to_owned()
        } else {
            check.zone.clone()
        };
        Ok(Some(Self {
            user: check.user.clone(),
            zone,
            level: check.level,
            object_column,
            last: None,
        }))
    }

    /// Checks one row. Denied rows fail the whole request.
    pub fn check_row<P>(&mut self, row: &[String], catalog: &mut P) -> Result<()>
    where
        P: PermissionCatalog + ?Sized,
    {
        let object_id = row.get(self.object_column).map(String::as_str).unwrap_or("");
        let allowed = match &self.last {
            Some((cached, decision)) if cached == object_id => *decision,
            _ => {
                let decision =
                    catalog.check_object_access(object_id, &self.user, &self.zone, self.level)?;
                self.last = Some((object_id.to_owned(), decision));
                decision
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(QueryError::denied(format!(
                "{}#{} lacks '{}' on object {object_id}",
                self.user, self.zone, self.level
            )))
        }
    }
}
