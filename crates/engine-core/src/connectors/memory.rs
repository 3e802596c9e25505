use crate::{
    connectors::{destination::ItemWriter, source::PageSource},
    error::StoreError,
};
use async_trait::async_trait;
use model::{
    core::value::Value,
    pagination::{
        cursor::ContinuationToken,
        descriptor::{Expression, QueryDescriptor, ScanDescriptor, Segment, Select},
        page::Page,
    },
    records::{
        batch::{BatchGetOutput, BatchGetRequest, BatchWriteOutput, MAX_BATCH_GET, MAX_BATCH_WRITE},
        row::Row,
        write::WriteRequest,
    },
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    ops::Bound,
};
use tokio::sync::RwLock;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Primary key layout of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl KeySchema {
    pub fn hash(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn composite(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    pub fn key_fields(&self) -> Vec<String> {
        let mut fields = vec![self.partition_key.clone()];
        fields.extend(self.sort_key.clone());
        fields
    }
}

/// Key attribute with the store's ordering: by type, then by value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyPart(Value);

impl KeyPart {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Binary(_) => 2,
            _ => 3,
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (a, b) => Self::rank(a).cmp(&Self::rank(b)),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type ItemKey = (KeyPart, Option<KeyPart>);

struct MemTable {
    schema: KeySchema,
    items: BTreeMap<ItemKey, Row>,
}

impl MemTable {
    fn item_key(&self, row: &Row) -> Result<ItemKey, StoreError> {
        let part = |name: &str| -> Result<KeyPart, StoreError> {
            match row.get(name) {
                Some(value) if value.is_scalar_key() => Ok(KeyPart(value.clone())),
                Some(value) => Err(StoreError::Validation(format!(
                    "key attribute '{name}' has unsupported type {}",
                    value.type_tag()
                ))),
                None => Err(StoreError::Validation(format!(
                    "missing key attribute '{name}'"
                ))),
            }
        };

        let partition = part(&self.schema.partition_key)?;
        let sort = match &self.schema.sort_key {
            Some(name) => Some(part(name)?),
            None => None,
        };
        Ok((partition, sort))
    }

    fn token_for(&self, row: &Row) -> ContinuationToken {
        ContinuationToken::new(row.project(&self.schema.key_fields()))
    }

    fn segment_of(key: &ItemKey, total: u32) -> u32 {
        let bytes = serde_json::to_vec(&key.0.0).unwrap_or_default();
        (xxh3_64(&bytes) % u64::from(total)) as u32
    }
}

/// Everything a read needs besides the ordered candidate items.
struct ReadPlan<'a> {
    limit: usize,
    filter: Option<&'a Expression>,
    projection: &'a [String],
    select: Select,
}

/// An in-process store with the same paging, segmentation and batch
/// semantics as the remote service.
///
/// Expression support is limited to conjunctions/disjunctions of `a = b`,
/// `a <> b`, `begins_with(a, b)`, `attribute_exists(a)` and
/// `attribute_not_exists(a)`.
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    page_size: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Number of items a request without an explicit limit examines per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn create_table(&self, name: impl Into<String>, schema: KeySchema) {
        let name = name.into();
        debug!(table = %name, "Creating in-memory table");
        self.tables.write().await.insert(
            name,
            MemTable {
                schema,
                items: BTreeMap::new(),
            },
        );
    }

    /// All items of a table in key order.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.items.values().cloned().collect())
    }

    pub async fn item_count(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.items.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn read_page<'a, I>(table: &MemTable, candidates: I, plan: ReadPlan<'_>) -> Result<Page, StoreError>
    where
        I: Iterator<Item = (&'a ItemKey, &'a Row)>,
    {
        let mut examined = 0usize;
        let mut matched = 0usize;
        let mut rows = Vec::new();
        let mut last: Option<&Row> = None;
        let mut more = false;

        for (_, row) in candidates {
            if examined == plan.limit {
                more = true;
                break;
            }
            examined += 1;
            last = Some(row);

            let keep = match plan.filter {
                Some(filter) => evaluate(filter, row)?,
                None => true,
            };
            if !keep {
                continue;
            }
            matched += 1;
            if plan.select == Select::AllAttributes {
                rows.push(if plan.projection.is_empty() {
                    row.clone()
                } else {
                    row.project(plan.projection)
                });
            }
        }

        let next = if more {
            last.map(|row| table.token_for(row))
        } else {
            None
        };

        Ok(Page {
            rows,
            next,
            count: Some(matched),
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageSource for InMemoryStore {
    async fn scan(&self, request: &ScanDescriptor) -> Result<Page, StoreError> {
        request
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        if request.index.is_some() {
            return Err(StoreError::Validation(
                "secondary indexes are not supported by the in-memory store".to_string(),
            ));
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;

        let start = match &request.start_key {
            Some(token) => Bound::Excluded(table.item_key(token.key())?),
            None => Bound::Unbounded,
        };
        let segment: Option<Segment> = request.segment;
        let candidates = table
            .items
            .range((start, Bound::Unbounded))
            .filter(|(key, _)| match segment {
                Some(s) => MemTable::segment_of(key, s.total) == s.index,
                None => true,
            });

        Self::read_page(
            table,
            candidates,
            ReadPlan {
                limit: request.limit.unwrap_or(self.page_size),
                filter: request.filter.as_ref(),
                projection: &request.projection,
                select: request.select,
            },
        )
    }

    async fn query(&self, request: &QueryDescriptor) -> Result<Page, StoreError> {
        request
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        if request.index.is_some() {
            return Err(StoreError::Validation(
                "secondary indexes are not supported by the in-memory store".to_string(),
            ));
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;

        let start = match &request.start_key {
            Some(token) => Some(table.item_key(token.key())?),
            None => None,
        };
        let ordered: Box<dyn Iterator<Item = (&ItemKey, &Row)>> = match (request.ascending, start)
        {
            (true, Some(k)) => Box::new(table.items.range((Bound::Excluded(k), Bound::Unbounded))),
            (true, None) => Box::new(table.items.iter()),
            (false, Some(k)) => Box::new(
                table
                    .items
                    .range((Bound::Unbounded, Bound::Excluded(k)))
                    .rev(),
            ),
            (false, None) => Box::new(table.items.iter().rev()),
        };

        // Rows outside the key condition are never examined, so they do not
        // count against the limit.
        let mut key_error = None;
        let candidates = ordered.filter(|(_, row)| {
            match evaluate(&request.key_condition, row) {
                Ok(hit) => hit,
                Err(e) => {
                    key_error.get_or_insert(e);
                    false
                }
            }
        });

        let page = Self::read_page(
            table,
            candidates,
            ReadPlan {
                limit: request.limit.unwrap_or(self.page_size),
                filter: request.filter.as_ref(),
                projection: &request.projection,
                select: request.select,
            },
        )?;

        match key_error {
            Some(e) => Err(e),
            None => Ok(page),
        }
    }

    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError> {
        if request.keys.is_empty() || request.keys.len() > MAX_BATCH_GET {
            return Err(StoreError::Validation(format!(
                "batch get accepts 1 to {MAX_BATCH_GET} keys, got {}",
                request.keys.len()
            )));
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound(request.table.clone()))?;

        let mut found = Vec::new();
        for key in &request.keys {
            let item_key = table.item_key(key)?;
            if let Some(row) = table.items.get(&item_key) {
                found.push(if request.projection.is_empty() {
                    row.clone()
                } else {
                    row.project(&request.projection)
                });
            }
        }

        let mut output = BatchGetOutput::default();
        output.responses.insert(request.table.clone(), found);
        Ok(output)
    }
}

#[async_trait]
impl ItemWriter for InMemoryStore {
    async fn batch_write(
        &self,
        table: &str,
        requests: &[WriteRequest],
    ) -> Result<BatchWriteOutput, StoreError> {
        if requests.is_empty() || requests.len() > MAX_BATCH_WRITE {
            return Err(StoreError::Validation(format!(
                "batch write accepts 1 to {MAX_BATCH_WRITE} requests, got {}",
                requests.len()
            )));
        }

        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        // Validate every key first so a rejected batch applies nothing.
        let keys = requests
            .iter()
            .map(|r| t.item_key(r.row()))
            .collect::<Result<Vec<_>, _>>()?;

        for (key, request) in keys.into_iter().zip(requests) {
            match request {
                WriteRequest::Put(row) => {
                    t.items.insert(key, row.clone());
                }
                WriteRequest::Delete(_) => {
                    t.items.remove(&key);
                }
            }
        }

        Ok(BatchWriteOutput::default())
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let key = t.item_key(&row)?;
        t.items.insert(key, row);
        Ok(())
    }
}

/// Evaluates the supported expression subset against a row.
fn evaluate(expr: &Expression, row: &Row) -> Result<bool, StoreError> {
    for group in expr.text.split(" OR ") {
        let mut all = true;
        for clause in group.split(" AND ") {
            if !evaluate_clause(clause, expr, row)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

fn evaluate_clause(clause: &str, expr: &Expression, row: &Row) -> Result<bool, StoreError> {
    let clause = clause.trim().trim_start_matches('(').trim_end_matches(')').trim();

    if let Some(args) = function_args(clause, "begins_with") {
        let [target, prefix] = args.as_slice() else {
            return Err(unsupported(clause));
        };
        let target = operand(target, expr, row)?;
        let prefix = operand(prefix, expr, row)?;
        return Ok(matches!((target, prefix), (Some(t), Some(p)) if t.begins_with(p)));
    }
    if let Some(args) = function_args(clause, "attribute_exists") {
        let [target] = args.as_slice() else {
            return Err(unsupported(clause));
        };
        return Ok(operand(target, expr, row)?.is_some());
    }
    if let Some(args) = function_args(clause, "attribute_not_exists") {
        let [target] = args.as_slice() else {
            return Err(unsupported(clause));
        };
        return Ok(operand(target, expr, row)?.is_none());
    }
    if let Some((lhs, rhs)) = clause.split_once("<>") {
        let lhs = operand(lhs, expr, row)?;
        let rhs = operand(rhs, expr, row)?;
        return Ok(lhs != rhs);
    }
    if let Some((lhs, rhs)) = clause.split_once('=') {
        let lhs = operand(lhs, expr, row)?;
        let rhs = operand(rhs, expr, row)?;
        return Ok(lhs.is_some() && lhs == rhs);
    }

    Err(unsupported(clause))
}

fn function_args<'a>(clause: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let rest = clause.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?;
    let inner = inner.strip_suffix(')').unwrap_or(inner);
    Some(inner.split(',').map(str::trim).collect())
}

fn operand<'a>(
    token: &str,
    expr: &'a Expression,
    row: &'a Row,
) -> Result<Option<&'a Value>, StoreError> {
    let token = token.trim();
    if token.starts_with(':') {
        return expr
            .values
            .get(token)
            .map(Some)
            .ok_or_else(|| StoreError::Validation(format!("unbound value placeholder '{token}'")));
    }
    if token.starts_with('#') {
        let name = expr
            .names
            .get(token)
            .ok_or_else(|| StoreError::Validation(format!("unbound name placeholder '{token}'")))?;
        return Ok(row.get(name));
    }
    Ok(row.get(token.trim_matches('\'')))
}

fn unsupported(clause: &str) -> StoreError {
    StoreError::Validation(format!("unsupported expression: {clause}"))
}
