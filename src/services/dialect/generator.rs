// SQL generator for the SQLite Cloud dialect
//
// Walks a query tree and produces SQL text plus the values bound to its
// placeholders, in placeholder order. Generation does no I/O.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::FeatureFlags;
use crate::error::{Result, ServiceError};
use crate::models::{
    ArithOp, Column, CompareOp, CreateView, Delete, DropKind, DropStatement, Entity, Expr, Insert,
    InsertData, Literal, LogicalType, Query, Select, SessionContext, Source, SqlValue, Update,
};
use crate::services::dialect::converters::canonical_value;
use crate::services::dialect::functions;
use crate::services::dialect::keywords::ReservedWords;

/// Name of the single column produced by JSON-mode SELECTs.
pub const JSON_COLUMN: &str = "_json_";

const NOW_VARIABLE: &str = "$now";

/// SQL text and its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Translates query trees into SQLite Cloud SQL.
///
/// The reserved-word table is shared read-only, so one generator can serve
/// every connection.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    reserved: Arc<ReservedWords>,
    features: FeatureFlags,
}

impl SqlGenerator {
    pub fn new(reserved: Arc<ReservedWords>, features: FeatureFlags) -> Self {
        Self { reserved, features }
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    /// Generate SQL for `query`. Session variables are read from `session`.
    pub fn generate(&self, query: &Query, session: Option<&SessionContext>) -> Result<GeneratedSql> {
        let mut render = Render {
            generator: self,
            session,
            values: Vec::new(),
            inline: false,
        };

        let sql = match query {
            Query::Select(select) => render.select(select)?,
            Query::Insert(insert) => render.insert(insert)?,
            Query::Update(update) => render.update(update)?,
            Query::Delete(delete) => render.delete(delete)?,
            Query::CreateTable(entity) => render.create_table(entity)?,
            Query::CreateView(view) => render.create_view(view)?,
            Query::Drop(drop) => render.drop(drop),
        };

        debug!("Generated SQL with {} bound values: {}", render.values.len(), sql);

        Ok(GeneratedSql {
            sql,
            values: render.values,
        })
    }

    /// Quote an identifier if the dialect requires it.
    pub fn quote(&self, identifier: &str) -> String {
        self.reserved.quote(identifier).into_owned()
    }

    /// Table name for an entity; namespace dots become underscores.
    pub fn table_name(&self, entity: &str) -> String {
        self.quote(&entity.replace('.', "_"))
    }

    /// Alias for a selected column: the explicit one, or the column's last
    /// path segment when an ORDER BY refers to it by that name.
    pub fn column_alias(&self, column: &Column, select: &Select) -> Option<String> {
        if let Some(alias) = &column.alias {
            return Some(alias.clone());
        }
        match &column.expr {
            Expr::Ref(path) => path
                .last()
                .filter(|name| select.order_by_aliases().contains(name.as_str()))
                .cloned(),
            _ => None,
        }
    }
}

struct Render<'a> {
    generator: &'a SqlGenerator,
    session: Option<&'a SessionContext>,
    values: Vec<SqlValue>,
    /// Views cannot carry parameters, so values are written as literals.
    inline: bool,
}

impl<'a> Render<'a> {
    fn quote(&self, identifier: &str) -> String {
        self.generator.quote(identifier)
    }

    fn bind(&mut self, value: SqlValue) -> String {
        if self.inline {
            return inline_literal(&value);
        }
        self.values.push(value);
        "?".to_string()
    }

    // ---- SELECT ----

    fn select(&mut self, select: &Select) -> Result<String> {
        if !select.json || select.columns.is_empty() {
            return self.plain_select(select, None);
        }

        let names = self.output_names(select)?;
        let plain = self.plain_select(select, Some(names.as_slice()))?;
        let features = *self.generator.features();
        let mut pairs = Vec::with_capacity(select.columns.len());
        for (column, name) in select.columns.iter().zip(&names) {
            let reference = format!("Q.{}", self.quote(name));
            let projected = column
                .ty
                .as_ref()
                .and_then(|ty| ty.output(&reference, &features))
                .unwrap_or(reference);
            pairs.push(format!("'{}',{}", name.replace('\'', "''"), projected));
        }

        Ok(format!(
            "SELECT json_object({}) AS {} FROM ({}) AS Q",
            pairs.join(","),
            JSON_COLUMN,
            plain
        ))
    }

    /// Keys of the JSON result, one per column.
    ///
    /// Explicit aliases must be unique. Derived names that collide get a
    /// numeric suffix (`ID`, `ID_2`) so no column is shadowed.
    fn output_names(&self, select: &Select) -> Result<Vec<String>> {
        let mut used = HashSet::new();
        for alias in select.columns.iter().filter_map(|c| c.alias.as_deref()) {
            if !used.insert(alias.to_string()) {
                return Err(ServiceError::InvalidQuery(format!(
                    "Duplicate column alias {} in SELECT",
                    alias
                )));
            }
        }

        let mut names = Vec::with_capacity(select.columns.len());
        for (index, column) in select.columns.iter().enumerate() {
            if let Some(alias) = &column.alias {
                names.push(alias.clone());
                continue;
            }
            let base = self
                .generator
                .column_alias(column, select)
                .or_else(|| match &column.expr {
                    Expr::Ref(path) => path.last().cloned(),
                    _ => None,
                })
                .unwrap_or_else(|| format!("column_{}", index + 1));

            let mut name = base.clone();
            let mut suffix = 2;
            while used.contains(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            used.insert(name.clone());
            names.push(name);
        }
        Ok(names)
    }

    fn plain_select(&mut self, select: &Select, names: Option<&[String]>) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }

        if select.columns.is_empty() {
            sql.push('*');
        } else {
            let mut columns = Vec::with_capacity(select.columns.len());
            for (index, column) in select.columns.iter().enumerate() {
                let expr = self.expr(&column.expr)?;
                let alias = match names {
                    Some(names) => names.get(index).cloned(),
                    None => self.generator.column_alias(column, select),
                };
                columns.push(match alias {
                    Some(alias) => format!("{} as {}", expr, self.quote(&alias)),
                    None => expr,
                });
            }
            sql.push_str(&columns.join(","));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.source(&select.from)?);

        if let Some(filter) = &select.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }

        if !select.group_by.is_empty() {
            let groups = select
                .group_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(","));
        }

        if let Some(having) = &select.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expr(having)?);
        }

        if !select.orderings().is_empty() {
            let mut orders = Vec::with_capacity(select.orderings().len());
            for order in select.orderings() {
                let expr = self.expr(&order.expr)?;
                orders.push(format!("{} {}", expr, if order.descending { "DESC" } else { "ASC" }));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(","));
        }

        match &select.limit {
            Some(limit) => {
                sql.push_str(&format!(" LIMIT {}", limit.rows));
                if let Some(offset) = limit.offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            None if select.one => sql.push_str(" LIMIT 1"),
            None => {}
        }

        // Row locks are not available through the remote protocol; select.lock adds nothing

        Ok(sql)
    }

    fn source(&mut self, source: &Source) -> Result<String> {
        match source {
            Source::Entity { name, alias } => {
                let table = self.generator.table_name(name);
                Ok(match alias {
                    Some(alias) => format!("{} as {}", table, self.quote(alias)),
                    None => table,
                })
            }
            Source::Query { select, alias } => Ok(format!(
                "({}) as {}",
                self.plain_select(select, None)?,
                self.quote(alias)
            )),
        }
    }

    // ---- expressions ----

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Ref(path) => Ok(path.iter().map(|s| self.quote(s)).collect::<Vec<_>>().join(".")),
            Expr::Val(literal) => self.val(literal),
            Expr::Func { name, args } => self.func(name, args),
            Expr::Compare { left, op, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let null_right = matches!(right.as_ref(), Expr::Val(Literal::Null));
                Ok(format!("{} {} {}", l, compare_operator(*op, null_right), r))
            }
            Expr::Arith { left, op, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                Ok(format!("({} {} {})", l, arith_operator(*op), r))
            }
            Expr::And(items) => self.junction(items, " and "),
            Expr::Or(items) => self.junction(items, " or "),
            Expr::Not(inner) => Ok(format!("not ({})", self.expr(inner)?)),
            Expr::IsNull(inner) => Ok(format!("{} is null", self.expr(inner)?)),
            Expr::IsNotNull(inner) => Ok(format!("{} is not null", self.expr(inner)?)),
            Expr::In { expr, list } => {
                let target = self.expr(expr)?;
                let items = match list.as_slice() {
                    [Expr::SubQuery(select)] => self.plain_select(select, None)?,
                    _ => list
                        .iter()
                        .map(|e| self.expr(e))
                        .collect::<Result<Vec<_>>>()?
                        .join(","),
                };
                Ok(format!("{} in ({})", target, items))
            }
            Expr::SubQuery(select) => Ok(format!("({})", self.plain_select(select, None)?)),
            Expr::SessionVar(name) => Ok(self.session_var(name)),
        }
    }

    fn junction(&mut self, items: &[Expr], separator: &str) -> Result<String> {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let rendered = self.expr(item)?;
            parts.push(match item {
                Expr::And(_) | Expr::Or(_) => format!("({})", rendered),
                _ => rendered,
            });
        }
        Ok(parts.join(separator))
    }

    fn val(&mut self, literal: &Literal) -> Result<String> {
        match literal {
            Literal::Null => Ok("NULL".to_string()),
            Literal::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Literal::Integer(i) => Ok(i.to_string()),
            Literal::Real(r) if r.is_finite() => Ok(r.to_string()),
            // ISO date-times compare as canonical instants, not as raw text
            other => {
                let value = canonical_value(None, other)?;
                Ok(self.bind(value))
            }
        }
    }

    fn func(&mut self, name: &str, args: &[Expr]) -> Result<String> {
        if name.eq_ignore_ascii_case("session_context") {
            return match args {
                [Expr::Val(Literal::Text(variable))] => Ok(self.session_var(variable)),
                _ => Err(ServiceError::InvalidQuery(
                    "session_context expects one variable name".to_string(),
                )),
            };
        }
        let rendered = args.iter().map(|a| self.expr(a)).collect::<Result<Vec<_>>>()?;
        Ok(functions::render(name, &rendered))
    }

    fn session_var(&mut self, name: &str) -> String {
        match self.session.and_then(|s| s.get(name)) {
            Some(value) if !value.is_null() => self.bind(SqlValue::from(value)),
            _ if name == NOW_VARIABLE => functions::now().to_string(),
            _ => "NULL".to_string(),
        }
    }

    // ---- INSERT / UPDATE / DELETE ----

    fn insert(&mut self, insert: &Insert) -> Result<String> {
        let entity = &insert.into;
        let table = self.generator.table_name(&entity.name);

        match &insert.data {
            InsertData::Entries(entries) => {
                let elements: Vec<_> = entity
                    .elements
                    .iter()
                    .filter(|e| e.ty.storage_type().is_some())
                    .filter(|e| entries.iter().any(|entry| entry.contains_key(&e.name)))
                    .collect();
                if elements.is_empty() {
                    return Err(ServiceError::InvalidQuery(format!(
                        "No insertable columns for {}",
                        entity.name
                    )));
                }

                let columns: Vec<String> = elements.iter().map(|e| self.quote(&e.name)).collect();
                let extracts: Vec<String> = elements
                    .iter()
                    .map(|e| {
                        let extract = format!("value->>'$.\"{}\"'", e.name.replace('\'', "''"));
                        e.ty.input(&extract).unwrap_or(extract)
                    })
                    .collect();

                let payload = Value::Array(entries.iter().cloned().map(Value::Object).collect());
                let placeholder = self.bind(SqlValue::Text(payload.to_string()));

                Ok(format!(
                    "INSERT INTO {} ({}) SELECT {} FROM json_each({})",
                    table,
                    columns.join(","),
                    extracts.join(","),
                    placeholder
                ))
            }
            InsertData::Rows { columns, rows } => {
                let types = columns
                    .iter()
                    .map(|c| {
                        entity.element(c).map(|e| &e.ty).ok_or_else(|| {
                            ServiceError::InvalidQuery(format!("Unknown column {} in {}", c, entity.name))
                        })
                    })
                    .collect::<Result<Vec<&LogicalType>>>()?;

                let mut tuples = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(ServiceError::InvalidQuery(format!(
                            "Row has {} values but {} columns were named",
                            row.len(),
                            columns.len()
                        )));
                    }
                    let mut placeholders = Vec::with_capacity(row.len());
                    for (ty, literal) in types.iter().zip(row) {
                        let value = canonical_value(Some(ty), literal)?;
                        placeholders.push(self.bind(value));
                    }
                    tuples.push(format!("({})", placeholders.join(",")));
                }

                let columns: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    table,
                    columns.join(","),
                    tuples.join(",")
                ))
            }
        }
    }

    fn update(&mut self, update: &Update) -> Result<String> {
        let entity = &update.entity;
        if update.set.is_empty() {
            return Err(ServiceError::InvalidQuery(format!(
                "UPDATE of {} sets no columns",
                entity.name
            )));
        }

        let mut assignments = Vec::with_capacity(update.set.len());
        for (column, expr) in &update.set {
            let ty = entity
                .element(column)
                .map(|e| &e.ty)
                .ok_or_else(|| ServiceError::InvalidQuery(format!("Unknown column {} in {}", column, entity.name)))?;

            let value = match expr {
                Expr::Val(Literal::Null) => "NULL".to_string(),
                Expr::Val(literal) => {
                    let value = canonical_value(Some(ty), literal)?;
                    self.bind(value)
                }
                other => {
                    let rendered = self.expr(other)?;
                    ty.input(&rendered).unwrap_or(rendered)
                }
            };
            assignments.push(format!("{} = {}", self.quote(column), value));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.generator.table_name(&entity.name),
            assignments.join(",")
        );
        if let Some(filter) = &update.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }
        Ok(sql)
    }

    fn delete(&mut self, delete: &Delete) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", self.generator.table_name(&delete.from));
        if let Some(filter) = &delete.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }
        Ok(sql)
    }

    // ---- DDL ----

    fn create_table(&mut self, entity: &Entity) -> Result<String> {
        let mut definitions = Vec::with_capacity(entity.elements.len() + 1);
        for element in &entity.elements {
            let Some(storage) = element.ty.storage_type() else {
                continue;
            };
            let mut definition = format!("{} {}", self.quote(&element.name), storage);
            if element.not_null {
                definition.push_str(" NOT NULL");
            }
            if let Some(default) = &element.default {
                let value = canonical_value(Some(&element.ty), default)?;
                definition.push_str(" DEFAULT ");
                definition.push_str(&inline_literal(&value));
            }
            definitions.push(definition);
        }

        if definitions.is_empty() {
            return Err(ServiceError::InvalidQuery(format!("Entity {} has no columns", entity.name)));
        }

        let keys: Vec<String> = entity
            .elements
            .iter()
            .filter(|e| e.key)
            .map(|e| self.quote(&e.name))
            .collect();
        if !keys.is_empty() {
            definitions.push(format!("PRIMARY KEY({})", keys.join(",")));
        }

        Ok(format!(
            "CREATE TABLE {} ( {} )",
            self.generator.table_name(&entity.name),
            definitions.join(", ")
        ))
    }

    fn create_view(&mut self, view: &CreateView) -> Result<String> {
        let inline = std::mem::replace(&mut self.inline, true);
        let select = self.plain_select(&view.select, None);
        self.inline = inline;
        Ok(format!(
            "CREATE VIEW {} AS {}",
            self.generator.table_name(&view.name),
            select?
        ))
    }

    fn drop(&self, drop: &DropStatement) -> String {
        let kind = match drop.kind {
            DropKind::Table => "TABLE",
            DropKind::View => "VIEW",
        };
        format!("DROP {} IF EXISTS {}", kind, self.generator.table_name(&drop.name))
    }
}

fn compare_operator(op: CompareOp, null_right: bool) -> &'static str {
    match op {
        CompareOp::Eq if null_right => "is",
        CompareOp::Ne if null_right => "is not",
        CompareOp::Eq => "=",
        CompareOp::Ne => "!=",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::Like => "like",
        CompareOp::IsDistinctFrom => "is not",
        CompareOp::IsNotDistinctFrom => "is",
    }
}

fn arith_operator(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
        ArithOp::Concat => "||",
    }
}

fn inline_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(r) if r.is_finite() => r.to_string(),
        SqlValue::Real(_) => "NULL".to_string(),
        SqlValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
    }
}
