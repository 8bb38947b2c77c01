//! DQL fragments as data. Everything that ends up in query text goes through
//! the `render` functions here, which own quoting and escaping.

use std::sync::LazyLock;

use regex::Regex;

use crate::value::Uid;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^~?[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap());

/// Predicate, facet, type and variable names. `~edge` and `dgraph.type` pass.
pub fn is_identifier(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// Double-quoted string literal with JSON escaping.
pub fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    AnyOfTerms,
    AllOfTerms,
    Regexp,
    UidIn,
    Has,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Ge => "ge",
            Operator::Le => "le",
            Operator::AnyOfTerms => "anyofterms",
            Operator::AllOfTerms => "allofterms",
            Operator::Regexp => "regexp",
            Operator::UidIn => "uid_in",
            Operator::Has => "has",
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "ge" => Ok(Operator::Ge),
            "le" => Ok(Operator::Le),
            "anyofterms" => Ok(Operator::AnyOfTerms),
            "allofterms" => Ok(Operator::AllOfTerms),
            "regexp" => Ok(Operator::Regexp),
            "uid_in" => Ok(Operator::UidIn),
            "has" => Ok(Operator::Has),
            _ => Err(()),
        }
    }
}

/// How several values supplied for one predicate are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl std::str::FromStr for Connector {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" | "all" | "implicit-and" => Ok(Connector::And),
            "or" | "any" => Ok(Connector::Or),
            _ => Err(()),
        }
    }
}

/// A function argument. Only `Text` and `Regex` carry user input; both are
/// escaped on render.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A registered predicate, facet or type name.
    Name(String),
    Text(String),
    /// A parsed number or boolean, rendered bare.
    Number(String),
    Uid(Uid),
    /// `$name`, bound through the query variables.
    Param(String),
    /// A block variable, e.g. `uid(filtered)`.
    VarRef(String),
    /// Rendered as a case-insensitive regex literal with metacharacters escaped.
    Regex(String),
}

impl Arg {
    fn render(&self) -> String {
        match self {
            Arg::Name(n) | Arg::VarRef(n) => n.clone(),
            Arg::Text(t) => quote(t),
            Arg::Number(n) => n.clone(),
            Arg::Uid(uid) => uid.to_string(),
            Arg::Param(p) => format!("${p}"),
            Arg::Regex(r) => format!("/{}/i", regex::escape(r).replace('/', "")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Func { name: &'static str, args: Vec<Arg> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn op(op: Operator, predicate: &str, arg: Arg) -> Self {
        Filter::Func {
            name: op.as_str(),
            args: vec![Arg::Name(predicate.to_string()), arg],
        }
    }

    pub fn has(predicate: &str) -> Self {
        Filter::Func {
            name: "has",
            args: vec![Arg::Name(predicate.to_string())],
        }
    }

    pub fn type_of(type_name: &str) -> Self {
        Filter::Func {
            name: "type",
            args: vec![Arg::Text(type_name.to_string())],
        }
    }

    pub fn uid_var(var: &str) -> Self {
        Filter::Func {
            name: "uid",
            args: vec![Arg::VarRef(var.to_string())],
        }
    }

    pub fn uid_param(param: &str) -> Self {
        Filter::Func {
            name: "uid",
            args: vec![Arg::Param(param.to_string())],
        }
    }

    /// Flattens single-element groups; `None` when there is nothing to combine.
    pub fn all(mut filters: Vec<Filter>) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }

    pub fn any(mut filters: Vec<Filter>) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::Or(filters)),
        }
    }

    pub fn combine(filters: Vec<Filter>, connector: Connector) -> Option<Filter> {
        match connector {
            Connector::And => Filter::all(filters),
            Connector::Or => Filter::any(filters),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Filter::Func { name, args } => {
                let args: Vec<String> = args.iter().map(Arg::render).collect();
                format!("{name}({})", args.join(", "))
            }
            Filter::And(parts) => render_group(parts, " AND "),
            Filter::Or(parts) => render_group(parts, " OR "),
        }
    }
}

fn render_group(parts: &[Filter], sep: &str) -> String {
    match parts {
        [] => String::new(),
        [one] => one.render(),
        _ => {
            let rendered: Vec<String> = parts.iter().map(Filter::render).collect();
            format!("({})", rendered.join(sep))
        }
    }
}

// --- Query blocks ---

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(String),
    /// `count(uid)` or `count(predicate)`
    Count(String),
    /// `v as uid`
    VarBind { var: String, predicate: String },
    Edge {
        predicate: String,
        facet_filter: Option<Filter>,
        facet_keys: Vec<String>,
        children: Vec<Selection>,
    },
}

impl Selection {
    pub fn field(name: &str) -> Self {
        Selection::Field(name.to_string())
    }

    pub fn nested(predicate: &str, children: &[&str]) -> Self {
        Selection::Edge {
            predicate: predicate.to_string(),
            facet_filter: None,
            facet_keys: Vec::new(),
            children: children.iter().map(|c| Selection::field(c)).collect(),
        }
    }

    fn predicate(&self) -> &str {
        match self {
            Selection::Field(p) | Selection::Count(p) => p,
            Selection::VarBind { predicate, .. } | Selection::Edge { predicate, .. } => predicate,
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self {
            Selection::Field(p) => out.push_str(&format!("{pad}{p}\n")),
            Selection::Count(p) => out.push_str(&format!("{pad}count({p})\n")),
            Selection::VarBind { var, predicate } => {
                out.push_str(&format!("{pad}{var} as {predicate}\n"))
            }
            Selection::Edge {
                predicate,
                facet_filter,
                facet_keys,
                children,
            } => {
                out.push_str(&format!("{pad}{predicate}"));
                if let Some(f) = facet_filter {
                    out.push_str(&format!(" @facets({})", f.render()));
                }
                if !facet_keys.is_empty() {
                    out.push_str(&format!(" @facets({})", facet_keys.join(", ")));
                }
                if children.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(" {\n");
                    for c in children {
                        c.render(depth + 1, out);
                    }
                    out.push_str(&format!("{pad}}}\n"));
                }
            }
        }
    }
}

/// Adds `sel` unless a selection on the same predicate is already present.
pub fn push_unique(selections: &mut Vec<Selection>, sel: Selection) {
    if !selections.iter().any(|s| s.predicate() == sel.predicate()) {
        selections.push(sel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Block name, or the variable bound by a `var` block.
    pub name: String,
    pub is_var: bool,
    pub func: Filter,
    pub order: Option<(Order, String)>,
    pub first: Option<u32>,
    pub offset: Option<u32>,
    pub filter: Option<Filter>,
    /// `Some(vec![])` renders a bare `@cascade`.
    pub cascade: Option<Vec<String>>,
    pub body: Vec<Selection>,
}

impl Block {
    pub fn new(name: &str, func: Filter) -> Self {
        Self {
            name: name.to_string(),
            is_var: false,
            func,
            order: None,
            first: None,
            offset: None,
            filter: None,
            cascade: None,
            body: Vec::new(),
        }
    }

    /// `name as var(func: ...)`
    pub fn var(name: &str, func: Filter) -> Self {
        Self {
            is_var: true,
            ..Self::new(name, func)
        }
    }

    pub fn render(&self, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let mut head = format!("func: {}", self.func.render());
        if let Some((order, predicate)) = &self.order {
            let key = match order {
                Order::Asc => "orderasc",
                Order::Desc => "orderdesc",
            };
            head.push_str(&format!(", {key}: {predicate}"));
        }
        if let Some(first) = self.first {
            head.push_str(&format!(", first: {first}"));
        }
        if let Some(offset) = self.offset {
            head.push_str(&format!(", offset: {offset}"));
        }

        if self.is_var {
            out.push_str(&format!("{pad}{} as var({head})", self.name));
        } else {
            out.push_str(&format!("{pad}{}({head})", self.name));
        }
        if let Some(filter) = &self.filter {
            out.push_str(&format!(" @filter({})", filter.render()));
        }
        match &self.cascade {
            Some(fields) if fields.is_empty() => out.push_str(" @cascade"),
            Some(fields) => out.push_str(&format!(" @cascade({})", fields.join(", "))),
            None => {}
        }
        if self.body.is_empty() {
            out.push('\n');
            return;
        }
        out.push_str(" {\n");
        for sel in &self.body {
            sel.render(depth + 1, out);
        }
        out.push_str(&format!("{pad}}}\n"));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    /// `($name: type)` declarations for bound variables.
    pub params: Vec<(String, &'static str)>,
    pub blocks: Vec<Block>,
}

impl Query {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, ty: &'static str) -> Self {
        self.params.push((name.to_string(), ty));
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("query {}", self.name);
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(n, t)| format!("${n}: {t}"))
                .collect();
            out.push_str(&format!("({})", params.join(", ")));
        }
        out.push_str(" {\n");
        out.push_str(&render_blocks(&self.blocks, 1));
        out.push_str("}\n");
        out
    }
}

/// Blocks without the surrounding `query name { }`, as used in upsert preludes.
pub fn render_blocks(blocks: &[Block], depth: usize) -> String {
    let mut out = String::new();
    for block in blocks {
        block.render(depth, &mut out);
    }
    out
}
