#![forbid(unsafe_code)]

//! Generic query compilation: select and condition lists in, SQL text and
//! positional binds out.

use tracing::{debug, trace};

use crate::catalog::{AttributeJoin, SchemaGraph, TransientState};
use crate::types::{ColumnId, QueryError, Result, TableId};

use super::access::inject_row_filter;
use super::clause::{OrderItem, SqlClauses, WhereNode};
use super::condition::{parse_condition, Fragment, ParsedCondition};
use super::dialect::Dialect;
use super::request::{Aggregation, CallerIdentity, OrderBy, QueryRequest, SelectColumn};
use super::resolver::resolve;

/// Output of a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Positional binds of `sql`.
    pub binds: Vec<String>,
    /// Statement counting the distinct rows of `sql`, without pagination.
    pub count_sql: String,
    /// Positional binds of `count_sql`.
    pub count_binds: Vec<String>,
    /// FROM entries.
    pub from: Vec<String>,
    /// Number of join predicates used to connect the tables.
    pub joins: usize,
    /// Select list the rows are laid out by.
    pub select: Vec<SelectColumn>,
}

/// Per-attribute-layout condition counters.
#[derive(Debug, Clone, Copy, Default)]
struct AttributeUse {
    names_seen: usize,
    values_seen: usize,
}

/// Attribute-value condition held in a WHERE slot until every name
/// condition is known. Value `ordinal` pairs with name `ordinal` when that
/// name exists, otherwise with the primary instance.
#[derive(Debug)]
struct PendingValue {
    slot: usize,
    attribute: usize,
    ordinal: usize,
    column: ColumnId,
    parsed: ParsedCondition,
}

/// Accumulates one compilation. Every compilation owns its own context, so
/// concurrent compilations over one graph never share state.
#[derive(Debug)]
pub struct QueryCompilationContext<'a> {
    graph: &'a SchemaGraph,
    dialect: &'a Dialect,
    caller: &'a CallerIdentity,
    state: TransientState,
    clauses: SqlClauses,
    select: Vec<SelectColumn>,
    selected_tables: Vec<TableId>,
    attributes: Vec<AttributeUse>,
    instance_joins: Vec<WhereNode>,
    pending_values: Vec<PendingValue>,
}

impl<'a> QueryCompilationContext<'a> {
    /// Starts a compilation with fresh transient state.
    pub fn new(graph: &'a SchemaGraph, dialect: &'a Dialect, caller: &'a CallerIdentity) -> Self {
        Self {
            graph,
            dialect,
            caller,
            state: graph.transient_state(),
            clauses: SqlClauses::default(),
            select: Vec::new(),
            selected_tables: Vec::new(),
            attributes: vec![AttributeUse::default(); graph.conventions().attribute_joins.len()],
            instance_joins: Vec::new(),
            pending_values: Vec::new(),
        }
    }

    fn check_restricted(&self, column: ColumnId) -> Result<()> {
        if self.graph.conventions().is_restricted(column) && !self.caller.privilege.is_local_admin()
        {
            return Err(QueryError::denied(format!(
                "column {column} is restricted to local administrators"
            )));
        }
        Ok(())
    }

    /// Adds a select column.
    pub fn add_select_column(&mut self, column: ColumnId, aggregation: Aggregation) -> Result<()> {
        self.add_select(SelectColumn {
            column,
            aggregate: aggregation,
            order: OrderBy::None,
        })
    }

    fn add_select(&mut self, select: SelectColumn) -> Result<()> {
        self.check_restricted(select.column)?;
        let graph = self.graph;
        let info = graph.column_info(select.column)?;
        let qualified = info.qualified();
        let expr = match select.aggregate.function() {
            Some(func) => format!("{func}({qualified})"),
            None => qualified,
        };
        self.clauses.select.push(expr);
        self.state.require(info.table_id);
        if !self.selected_tables.contains(&info.table_id) {
            self.selected_tables.push(info.table_id);
        }
        self.select.push(select);
        Ok(())
    }

    /// Adds a condition on `column`.
    ///
    /// The k-th condition on an attribute-name column targets attribute
    /// instance k, so one object can match several name/value pairs.
    pub fn add_condition(&mut self, column: ColumnId, expression: &str) -> Result<()> {
        self.check_restricted(column)?;
        let graph = self.graph;
        let info = graph.column_info(column)?;
        let parsed = parse_condition(expression)?;
        let conventions = graph.conventions();
        if let Some((idx, _)) = conventions.attribute_by_value(column) {
            let usage = &mut self.attributes[idx];
            usage.values_seen += 1;
            self.pending_values.push(PendingValue {
                slot: self.clauses.where_nodes.len(),
                attribute: idx,
                ordinal: usage.values_seen,
                column,
                parsed,
            });
            self.clauses
                .where_nodes
                .push(WhereNode::Predicate(Fragment::default()));
            return Ok(());
        }
        let column_ref = match conventions.attribute_by_name(column) {
            Some((idx, join)) => {
                let usage = &mut self.attributes[idx];
                usage.names_seen += 1;
                let instance = usage.names_seen;
                self.instance_column(join, instance, column)?
            }
            None => {
                self.state.require(info.table_id);
                info.qualified()
            }
        };
        let node = render_condition(parsed, &column_ref, self.dialect);
        self.clauses.where_nodes.push(node);
        Ok(())
    }

    /// Reference to `column` on attribute instance `instance`; instance 1 is
    /// the primary table of the schema graph.
    fn instance_column(
        &mut self,
        join: &AttributeJoin,
        instance: usize,
        column: ColumnId,
    ) -> Result<String> {
        let graph = self.graph;
        let info = graph.column_info(column)?;
        if instance <= 1 {
            self.state.require(info.table_id);
            return Ok(info.qualified());
        }
        self.add_instance(join, instance)?;
        Ok(format!("{}.{}", join.meta_instance(instance), info.column))
    }

    fn place_attribute_values(&mut self) -> Result<()> {
        let graph = self.graph;
        for pending in std::mem::take(&mut self.pending_values) {
            let join = &graph.conventions().attribute_joins[pending.attribute];
            let names = self.attributes[pending.attribute].names_seen;
            let instance = if pending.ordinal <= names {
                pending.ordinal
            } else {
                1
            };
            let column_ref = self.instance_column(join, instance, pending.column)?;
            self.clauses.where_nodes[pending.slot] =
                render_condition(pending.parsed, &column_ref, self.dialect);
        }
        Ok(())
    }

    fn add_instance(&mut self, join: &AttributeJoin, instance: usize) -> Result<()> {
        let object = self.graph.table_index_by_name(&join.object_table)?;
        self.state.require(object);
        let map = join.map_instance(instance);
        let meta = join.meta_instance(instance);
        let added_map = self.clauses.from.add(&format!("{} {map}", join.map_table));
        let added_meta = self.clauses.from.add(&format!("{} {meta}", join.meta_table));
        if added_map || added_meta {
            self.instance_joins.push(WhereNode::Join(format!(
                "{map}.{key} = {meta}.{key}",
                key = join.meta_key
            )));
            self.instance_joins.push(WhereNode::Join(format!(
                "{}.{} = {map}.{}",
                join.object_table, join.object_id_column, join.map_object_column
            )));
        }
        Ok(())
    }

    fn add_ordering(&mut self) -> Result<()> {
        let graph = self.graph;
        for select in &self.select {
            if select.order == OrderBy::None || select.aggregate.is_aggregate() {
                continue;
            }
            let column = graph.column_info(select.column)?.qualified();
            if !self.clauses.orders_on(&column) {
                self.clauses.order_by.push(OrderItem {
                    column,
                    descending: select.order == OrderBy::Desc,
                });
            }
        }
        for canonical in &graph.conventions().canonical_order {
            let selected = self
                .select
                .iter()
                .any(|s| s.column == *canonical && !s.aggregate.is_aggregate());
            if !selected {
                continue;
            }
            let column = graph.column_info(*canonical)?.qualified();
            if !self.clauses.orders_on(&column) {
                self.clauses.order_by.push(OrderItem {
                    column,
                    descending: false,
                });
            }
        }
        Ok(())
    }

    fn add_grouping(&mut self) -> Result<()> {
        let aggregated = self.select.iter().any(|s| s.aggregate.is_aggregate());
        let plain = self.select.iter().any(|s| !s.aggregate.is_aggregate());
        if aggregated && plain {
            for select in self.select.iter().filter(|s| !s.aggregate.is_aggregate()) {
                let column = self.graph.column_info(select.column)?.qualified();
                if !self.clauses.group_by.contains(&column) {
                    self.clauses.group_by.push(column);
                }
            }
        }
        Ok(())
    }

    /// Resolves joins, applies access filters and renders the statement.
    pub fn finish(mut self, offset: u64, options: &CompileOptions<'_>) -> Result<CompiledQuery> {
        if self.select.is_empty() {
            return Err(QueryError::InvalidRequest {
                reason: "select list is empty",
            });
        }
        self.place_attribute_values()?;
        let tree = resolve(self.graph, &mut self.state)?;
        tree.apply(self.graph, &self.state, &mut self.clauses);
        let instance_joins = std::mem::take(&mut self.instance_joins);
        self.clauses.where_nodes.extend(instance_joins);
        inject_row_filter(
            self.graph,
            &self.selected_tables,
            self.caller,
            options.strict,
            options.anonymous_user,
            &mut self.clauses,
        )?;
        self.add_grouping()?;
        self.add_ordering()?;

        let statement = self.clauses.render(self.dialect.pagination_clause(offset));
        let count = self.clauses.render_count();
        if options.log_sql {
            debug!(target: "genquery::sql", sql = %statement.sql, binds = statement.binds.len(), "genquery.compile.sql");
        } else {
            trace!(sql = %statement.sql, binds = statement.binds.len(), "genquery.compile.sql");
        }
        Ok(CompiledQuery {
            sql: statement.sql,
            binds: statement.binds,
            count_sql: count.sql,
            count_binds: count.binds,
            from: self.clauses.from.entries().to_vec(),
            joins: self.clauses.join_count(),
            select: self.select,
        })
    }
}

fn render_condition(parsed: ParsedCondition, column: &str, dialect: &Dialect) -> WhereNode {
    match parsed {
        ParsedCondition::Simple(cond) => WhereNode::Predicate(cond.render(column, dialect)),
        ParsedCondition::Compound {
            connective,
            left,
            right,
        } => WhereNode::Compound {
            connective,
            left: left.render(column, dialect),
            right: right.render(column, dialect),
        },
    }
}

/// Settings that shape compilation beyond the request itself.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions<'a> {
    /// Strict access policy in effect.
    pub strict: bool,
    /// Identity whose queries are always filtered.
    pub anonymous_user: &'a str,
    /// Log compiled SQL at debug level.
    pub log_sql: bool,
}

impl Default for CompileOptions<'_> {
    fn default() -> Self {
        Self {
            strict: false,
            anonymous_user: "anonymous",
            log_sql: false,
        }
    }
}

/// Compiles whole requests against one schema and dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    graph: &'a SchemaGraph,
    dialect: &'a Dialect,
    options: CompileOptions<'a>,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler with default options.
    pub fn new(graph: &'a SchemaGraph, dialect: &'a Dialect) -> Self {
        Self {
            graph,
            dialect,
            options: CompileOptions::default(),
        }
    }

    /// Replaces the compile options.
    pub fn with_options(mut self, options: CompileOptions<'a>) -> Self {
        self.options = options;
        self
    }

    /// Compiles `request` on behalf of `caller`.
    pub fn compile(&self, request: &QueryRequest, caller: &CallerIdentity) -> Result<CompiledQuery> {
        let mut ctx = QueryCompilationContext::new(self.graph, self.dialect, caller);
        for select in &request.select {
            ctx.add_select(*select)?;
        }
        for condition in &request.conditions {
            ctx.add_condition(condition.column, &condition.expression)?;
        }
        ctx.finish(request.offset, &self.options)
    }
}
