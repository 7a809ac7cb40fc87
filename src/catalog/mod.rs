#![forbid(unsafe_code)]

//! Schema graph store: the static registry of tables, columns and links that
//! generic queries are compiled against.
//!
//! Tables are graph nodes, links are undirected edges carrying literal join
//! predicate text, and columns map abstract [`ColumnId`]s onto concrete
//! `table.column` references. Everything registered here is immutable once the
//! schema is handed to a [`crate::QueryEngine`]; per-query bookkeeping lives in
//! [`TransientState`], which every compilation owns privately.

use std::ops::RangeInclusive;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{ColumnId, LinkId, QueryError, Result, SchemaLimitKind, TableId};

/// Offline acyclicity check for the non-cycler subgraph.
pub mod cycles;

/// TOML schema definitions.
pub mod definition;

/// Built-in metadata catalog schema.
pub mod standard;

mod transient;

pub use cycles::{find_cycle, CycleReport};
pub use definition::SchemaDefinition;
pub use transient::TransientState;
pub(crate) use transient::Visit;

/// A registered relational table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Binding used in column references (`name.column`).
    pub name: String,
    /// FROM clause text; either the name itself or `base_table name`.
    pub alias: String,
    /// Exploration stops at cycler tables.
    pub cycler: bool,
}

impl Table {
    /// Returns the binding a FROM entry introduces: its last whitespace token.
    pub fn binding(&self) -> &str {
        from_binding(&self.alias)
    }
}

/// Last whitespace-delimited token of a FROM entry.
pub(crate) fn from_binding(text: &str) -> &str {
    text.split_whitespace().last().unwrap_or(text)
}

/// Abstract column registered against a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Abstract identifier used by requests.
    pub id: ColumnId,
    /// Owning table.
    pub table: TableId,
    /// Concrete column name.
    pub name: String,
}

/// Join predicate between two tables, traversable in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Table the link was registered from.
    pub left: TableId,
    /// Table the link was registered to.
    pub right: TableId,
    /// Literal predicate text appended to WHERE when the link is used.
    pub predicate: String,
}

impl Link {
    /// Returns the endpoint opposite `table`.
    pub fn other(&self, table: TableId) -> TableId {
        if self.left == table {
            self.right
        } else {
            self.left
        }
    }
}

/// Resolved view of a column and the table that owns it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnInfo<'a> {
    /// Abstract identifier.
    pub id: ColumnId,
    /// Owning table index.
    pub table_id: TableId,
    /// Owning table.
    pub table: &'a Table,
    /// Concrete column name.
    pub column: &'a str,
}

impl ColumnInfo<'_> {
    /// Returns `table.column`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table.name, self.column)
    }
}

/// Optional registry caps. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLimits {
    /// Maximum number of tables.
    pub max_tables: Option<usize>,
    /// Maximum number of columns.
    pub max_columns: Option<usize>,
    /// Maximum number of links.
    pub max_links: Option<usize>,
}

/// Inclusive range of column ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    /// First id in the range.
    pub start: u32,
    /// Last id in the range.
    pub end: u32,
}

impl ColumnRange {
    /// Returns true when `column` falls inside the range.
    pub fn contains(&self, column: ColumnId) -> bool {
        (self.start..=self.end).contains(&column.0)
    }
}

impl From<RangeInclusive<u32>> for ColumnRange {
    fn from(range: RangeInclusive<u32>) -> Self {
        ColumnRange {
            start: *range.start(),
            end: *range.end(),
        }
    }
}

/// Describes a generic key/value attribute layout: an object table joined to
/// attribute rows through a mapping table.
///
/// When a request conditions on `name_column` more than once, every
/// occurrence after the first is redirected to a fresh, index-suffixed copy of
/// the mapping and metadata tables joined back to `object_table`, so that each
/// name/value pair must hold on a distinct attribute row of the same object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeJoin {
    /// Attribute-name column.
    pub name_column: ColumnId,
    /// Attribute-value column paired with `name_column`.
    pub value_column: ColumnId,
    /// Base table of the mapping rows.
    pub map_table: String,
    /// Binding of the primary mapping instance.
    pub map_binding: String,
    /// Base table of the attribute rows.
    pub meta_table: String,
    /// Binding of the primary attribute instance.
    pub meta_binding: String,
    /// Column shared by mapping and attribute rows.
    pub meta_key: String,
    /// Mapping column referencing the object.
    pub map_object_column: String,
    /// Binding of the primary object table.
    pub object_table: String,
    /// Object identifier column on `object_table`.
    pub object_id_column: String,
}

impl AttributeJoin {
    /// Binding of the mapping table for instance `index` (1-based).
    pub fn map_instance(&self, index: usize) -> String {
        instance_binding(&self.map_binding, index)
    }

    /// Binding of the attribute table for instance `index` (1-based).
    pub fn meta_instance(&self, index: usize) -> String {
        instance_binding(&self.meta_binding, index)
    }
}

fn instance_binding(base: &str, index: usize) -> String {
    if index <= 1 {
        base.to_owned()
    } else {
        format!("{base}_{index}")
    }
}

/// Table whose rows are only visible through an access grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedTable {
    /// Table binding.
    pub table: String,
    /// Object id column correlated with grant rows.
    pub id_column: String,
}

/// Table and value names of the access-grant chain
/// (user → group membership → ACL entry → access token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantChain {
    /// ACL entries: `object_id`, `user_id`, `access_type_id`.
    pub access_table: String,
    /// Group membership: `group_user_id`, `user_id`.
    pub group_table: String,
    /// Users: `user_id`, `user_name`, `zone_name`, `user_type_name`.
    pub user_table: String,
    /// Tokens: `token_namespace`, `token_id`, `token_name`.
    pub token_table: String,
    /// `user_type_name` of group rows, which never match as callers.
    pub group_type_name: String,
    /// Token namespace of access levels.
    pub token_namespace: String,
    /// Token name of the minimum level required to see a row.
    pub read_token: String,
}

impl Default for GrantChain {
    fn default() -> Self {
        Self {
            access_table: "r_objt_access".into(),
            group_table: "r_user_group".into(),
            user_table: "r_user_main".into(),
            token_table: "r_tokn_main".into(),
            group_type_name: "rodsgroup".into(),
            token_namespace: "access_type".into(),
            read_token: "read object".into(),
        }
    }
}

/// Catalog-specific compilation rules registered alongside the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConventions {
    /// Columns implicitly appended to ORDER BY when selected.
    pub canonical_order: Vec<ColumnId>,
    /// Column ranges reserved for local administrators.
    pub restricted_columns: Vec<ColumnRange>,
    /// Key/value attribute layouts.
    pub attribute_joins: Vec<AttributeJoin>,
    /// Tables filtered by access grants for untrusted callers.
    pub protected_tables: Vec<ProtectedTable>,
    /// Grant chain names used by row filters and permission checks.
    pub grant_chain: GrantChain,
    /// Columns identifying an object for per-row permission checks.
    pub object_id_columns: Vec<ColumnId>,
}

impl QueryConventions {
    /// Returns true when `column` is reserved for local administrators.
    pub fn is_restricted(&self, column: ColumnId) -> bool {
        self.restricted_columns.iter().any(|r| r.contains(column))
    }

    /// Attribute layout whose name column is `column`.
    pub fn attribute_by_name(&self, column: ColumnId) -> Option<(usize, &AttributeJoin)> {
        self.attribute_joins
            .iter()
            .enumerate()
            .find(|(_, join)| join.name_column == column)
    }

    /// Attribute layout whose value column is `column`.
    pub fn attribute_by_value(&self, column: ColumnId) -> Option<(usize, &AttributeJoin)> {
        self.attribute_joins
            .iter()
            .enumerate()
            .find(|(_, join)| join.value_column == column)
    }
}

#[derive(Debug, Clone, Default)]
struct Incidence {
    outgoing: SmallVec<[LinkId; 4]>,
    incoming: SmallVec<[LinkId; 4]>,
}

/// Registry of tables, columns and links.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    tables: Vec<Table>,
    table_index: FxHashMap<String, TableId>,
    columns: Vec<Column>,
    column_index: FxHashMap<ColumnId, usize>,
    links: Vec<Link>,
    incidence: Vec<Incidence>,
    limits: SchemaLimits,
    conventions: QueryConventions,
}

impl SchemaGraph {
    /// Creates an empty, unbounded schema graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty schema graph with registry caps.
    pub fn with_limits(limits: SchemaLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Registers a table. `alias` defaults to `name` when empty.
    pub fn register_table(&mut self, name: &str, alias: &str, cycler: bool) -> Result<TableId> {
        check_limit(self.tables.len(), self.limits.max_tables, SchemaLimitKind::Tables)?;
        if self.table_index.contains_key(name) {
            return Err(QueryError::DuplicateTable { name: name.into() });
        }
        let alias = if alias.trim().is_empty() {
            name.to_owned()
        } else {
            alias.trim().to_owned()
        };
        if from_binding(&alias) != name {
            return Err(QueryError::InvalidSchema {
                reason: format!("alias '{alias}' does not bind table name '{name}'"),
            });
        }
        let id = TableId(self.tables.len());
        self.tables.push(Table {
            name: name.to_owned(),
            alias,
            cycler,
        });
        self.incidence.push(Incidence::default());
        self.table_index.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Registers an abstract column against an existing table.
    pub fn register_column(&mut self, id: ColumnId, table: &str, column: &str) -> Result<()> {
        check_limit(
            self.columns.len(),
            self.limits.max_columns,
            SchemaLimitKind::Columns,
        )?;
        if self.column_index.contains_key(&id) {
            return Err(QueryError::DuplicateColumn { column: id });
        }
        let table = self.table_index_by_name(table)?;
        self.column_index.insert(id, self.columns.len());
        self.columns.push(Column {
            id,
            table,
            name: column.to_owned(),
        });
        Ok(())
    }

    /// Registers a join predicate between two existing tables.
    pub fn register_link(&mut self, left: &str, right: &str, predicate: &str) -> Result<LinkId> {
        check_limit(self.links.len(), self.limits.max_links, SchemaLimitKind::Links)?;
        let left = self.table_index_by_name(left)?;
        let right = self.table_index_by_name(right)?;
        if left == right {
            return Err(QueryError::InvalidSchema {
                reason: format!("link on '{}' joins the table to itself", self.tables[left.0].name),
            });
        }
        let id = LinkId(self.links.len());
        self.links.push(Link {
            left,
            right,
            predicate: predicate.trim().to_owned(),
        });
        self.incidence[left.0].outgoing.push(id);
        self.incidence[right.0].incoming.push(id);
        Ok(id)
    }

    /// Replaces the compilation conventions after checking their references.
    pub fn set_conventions(&mut self, conventions: QueryConventions) -> Result<()> {
        for column in conventions
            .canonical_order
            .iter()
            .chain(conventions.object_id_columns.iter())
        {
            self.column_info(*column)?;
        }
        for join in &conventions.attribute_joins {
            let name = self.column_info(join.name_column)?;
            let value = self.column_info(join.value_column)?;
            if name.table.name != join.meta_binding || value.table.name != join.meta_binding {
                return Err(QueryError::InvalidSchema {
                    reason: format!(
                        "attribute columns {} and {} must live on '{}'",
                        join.name_column, join.value_column, join.meta_binding
                    ),
                });
            }
            self.table_index_by_name(&join.map_binding)?;
            self.table_index_by_name(&join.object_table)?;
        }
        for protected in &conventions.protected_tables {
            self.table_index_by_name(&protected.table)?;
        }
        self.conventions = conventions;
        Ok(())
    }

    /// Creates fresh per-compilation bookkeeping sized for this graph.
    pub fn transient_state(&self) -> TransientState {
        TransientState::new(self.tables.len())
    }

    /// Resolves a table name to its index.
    pub fn table_index_by_name(&self, name: &str) -> Result<TableId> {
        self.table_index
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::UnknownTable { name: name.into() })
    }

    /// Resolves an abstract column id.
    pub fn column_info(&self, id: ColumnId) -> Result<ColumnInfo<'_>> {
        let column = self
            .column_index
            .get(&id)
            .map(|&idx| &self.columns[idx])
            .ok_or(QueryError::UnknownColumn { column: id })?;
        Ok(ColumnInfo {
            id,
            table_id: column.table,
            table: &self.tables[column.table.0],
            column: &column.name,
        })
    }

    /// Returns the table at `id`.
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    /// Returns the link at `id`.
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// All tables in registration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// All columns in registration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All links in registration order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Compilation conventions.
    pub fn conventions(&self) -> &QueryConventions {
        &self.conventions
    }

    /// Links touching `table` paired with the opposite endpoint: links
    /// registered from `table` first, then links registered to it, each in
    /// registration order.
    pub fn incident_links(&self, table: TableId) -> impl Iterator<Item = (LinkId, TableId)> + '_ {
        let incidence = &self.incidence[table.0];
        incidence
            .outgoing
            .iter()
            .chain(incidence.incoming.iter())
            .map(move |&link| (link, self.links[link.0].other(table)))
    }

    /// Runs the cycle validator over the non-cycler subgraph.
    pub fn validate(&self) -> Result<()> {
        match find_cycle(self) {
            None => Ok(()),
            Some(report) => {
                let table = self.table(report.table).name.clone();
                let link = self.link(report.link).predicate.clone();
                tracing::error!(%table, %link, "catalog.validate.cycle");
                Err(QueryError::SchemaCycle { table, link })
            }
        }
    }
}

fn check_limit(current: usize, max: Option<usize>, kind: SchemaLimitKind) -> Result<()> {
    match max {
        Some(max) if current >= max => Err(QueryError::SchemaLimitExceeded { kind, max }),
        _ => Ok(()),
    }
}
