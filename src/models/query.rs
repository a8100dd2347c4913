// Query tree consumed by the SQL generator.
//
// The engine that builds these trees lives outside this crate; the shapes
// below are what it hands over. Builders are provided for the common cases.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::value::Literal;

/// Logical element types that drive value conversion and DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalType {
    String { length: Option<u32> },
    LargeString,
    Uuid,
    Boolean,
    Integer,
    Int64,
    Decimal { precision: Option<u32>, scale: Option<u32> },
    Double,
    Date,
    Time,
    DateTime,
    Timestamp,
    Binary { length: Option<u32> },
    LargeBinary,
    Struct,
    Array,
    Map,
    Association,
}

/// A typed element of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub ty: LogicalType,
    pub key: bool,
    pub not_null: bool,
    pub default: Option<Literal>,
}

impl Element {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
            key: false,
            not_null: false,
            default: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self.not_null = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Literal>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A persisted entity with its typed elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub elements: Vec<Element>,
}

impl Entity {
    pub fn new(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            elements,
        }
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsDistinctFrom,
    IsNotDistinctFrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column path, e.g. `["Books", "title"]`.
    Ref(Vec<String>),
    Val(Literal),
    Func { name: String, args: Vec<Expr> },
    Compare { left: Box<Expr>, op: CompareOp, right: Box<Expr> },
    Arith { left: Box<Expr>, op: ArithOp, right: Box<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    In { expr: Box<Expr>, list: Vec<Expr> },
    SubQuery(Box<Select>),
    /// A request-scoped session variable such as `$user.id`.
    SessionVar(String),
}

impl Expr {
    pub fn col(path: &str) -> Self {
        Expr::Ref(path.split('.').map(str::to_string).collect())
    }

    pub fn val(value: impl Into<Literal>) -> Self {
        Expr::Val(value.into())
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    pub fn session(name: impl Into<String>) -> Self {
        Expr::SessionVar(name.into())
    }

    pub fn compare(self, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: Expr) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn arith(self, op: ArithOp, right: Expr) -> Self {
        Expr::Arith {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut items) => {
                items.push(other);
                Expr::And(items)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut items) => {
                items.push(other);
                Expr::Or(items)
            }
            first => Expr::Or(vec![first, other]),
        }
    }
}

/// A selected column with an optional alias and declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub expr: Expr,
    pub alias: Option<String>,
    pub ty: Option<LogicalType>,
}

impl Column {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            alias: None,
            ty: None,
        }
    }

    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn typed(mut self, ty: LogicalType) -> Self {
        self.ty = Some(ty);
        self
    }
}

impl From<&str> for Column {
    fn from(path: &str) -> Self {
        Column::new(Expr::col(path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    ForUpdate,
    ForShare,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Entity { name: String, alias: Option<String> },
    Query { select: Box<Select>, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub rows: u64,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Select {
    pub from: Source,
    /// Empty means `*`.
    pub columns: Vec<Column>,
    pub distinct: bool,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    /// Private so the memoized ORDER BY aliases cannot go stale.
    order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
    /// Expect a single row.
    pub one: bool,
    /// Wrap each row into one JSON text column.
    pub json: bool,
    pub lock: Option<Lock>,
    order_by_aliases: OnceLock<HashSet<String>>,
}

impl PartialEq for Select {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
            && self.columns == other.columns
            && self.distinct == other.distinct
            && self.filter == other.filter
            && self.group_by == other.group_by
            && self.having == other.having
            && self.order_by == other.order_by
            && self.limit == other.limit
            && self.one == other.one
            && self.json == other.json
            && self.lock == other.lock
    }
}

impl Select {
    pub fn from_entity(entity: impl Into<String>) -> Self {
        Self::from_source(Source::Entity {
            name: entity.into(),
            alias: None,
        })
    }

    pub fn from_source(from: Source) -> Self {
        Self {
            from,
            columns: Vec::new(),
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            one: false,
            json: true,
            lock: None,
            order_by_aliases: OnceLock::new(),
        }
    }

    pub fn columns<C: Into<Column>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(expr);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, expr: Expr) -> Self {
        self.having = Some(expr);
        self
    }

    pub fn order_by(mut self, expr: Expr, descending: bool) -> Self {
        self.order_by.push(OrderBy { expr, descending });
        self.order_by_aliases = OnceLock::new();
        self
    }

    pub fn limit(mut self, rows: u64, offset: Option<u64>) -> Self {
        self.limit = Some(Limit { rows, offset });
        self
    }

    pub fn one(mut self) -> Self {
        self.one = true;
        self
    }

    /// Return plain columns instead of one JSON text column per row.
    pub fn plain(mut self) -> Self {
        self.json = false;
        self
    }

    pub fn for_update(mut self) -> Self {
        self.lock = Some(Lock::ForUpdate);
        self
    }

    pub fn for_share(mut self) -> Self {
        self.lock = Some(Lock::ForShare);
        self
    }

    pub fn orderings(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Single-segment ORDER BY references, computed once per query.
    pub fn order_by_aliases(&self) -> &HashSet<String> {
        self.order_by_aliases.get_or_init(|| {
            self.order_by
                .iter()
                .filter_map(|o| match &o.expr {
                    Expr::Ref(path) if path.len() == 1 => Some(path[0].clone()),
                    _ => None,
                })
                .collect()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertData {
    /// Objects keyed by element name; bound as one JSON array.
    Entries(Vec<Map<String, Value>>),
    /// Positional rows; one placeholder per value.
    Rows { columns: Vec<String>, rows: Vec<Vec<Literal>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub into: Entity,
    pub data: InsertData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub entity: Entity,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub from: String,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateView {
    pub name: String,
    pub select: Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Table,
    View,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropStatement {
    pub kind: DropKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateTable(Entity),
    CreateView(CreateView),
    Drop(DropStatement),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_aliases_single_segment_only() {
        let select = Select::from_entity("Books")
            .order_by(Expr::col("title"), false)
            .order_by(Expr::col("author.name"), true)
            .order_by(Expr::func("lower", vec![Expr::col("genre")]), false);

        let aliases = select.order_by_aliases();
        assert_eq!(aliases.len(), 1);
        assert!(aliases.contains("title"));
    }

    #[test]
    fn test_adding_an_ordering_resets_aliases() {
        let select = Select::from_entity("Books").order_by(Expr::col("title"), false);
        assert!(select.order_by_aliases().contains("title"));

        let select = select.order_by(Expr::col("stock"), true);
        assert!(select.order_by_aliases().contains("stock"));
        assert_eq!(select.orderings().len(), 2);
        assert!(select.orderings()[1].descending);
    }

    #[test]
    fn test_order_by_aliases_are_memoized() {
        let select = Select::from_entity("Books").order_by(Expr::col("title"), false);
        let first = select.order_by_aliases() as *const HashSet<String>;
        let second = select.order_by_aliases() as *const HashSet<String>;
        assert_eq!(first, second);
    }

    #[test]
    fn test_and_flattens() {
        let expr = Expr::col("a")
            .equals(Expr::val(1))
            .and(Expr::col("b").equals(Expr::val(2)))
            .and(Expr::col("c").equals(Expr::val(3)));
        match expr {
            Expr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_entity_element_lookup() {
        let entity = Entity::new(
            "Books",
            vec![
                Element::new("ID", LogicalType::Integer).key(),
                Element::new("title", LogicalType::String { length: Some(111) }),
            ],
        );
        assert!(entity.element("ID").unwrap().key);
        assert!(entity.element("missing").is_none());
    }
}
