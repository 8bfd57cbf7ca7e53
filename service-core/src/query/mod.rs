//! Generic list-query shaping: filter, select, sort and paginate.
//!
//! Raw query-string pairs are translated into a MongoDB filter, sort and
//! find options against a per-resource [`QuerySchema`]. The grammar is:
//!
//! - `field=value` for equality, `field[gt|gte|lt|lte|in]=value` for comparisons
//!   (`in` takes a comma-separated list),
//! - `select=a,b` to restrict returned fields (`id` is always kept),
//! - `sort=-a,b` with `-` for descending (default `-created_at`),
//! - `page` (1-based, default 1) and `limit` (default 10, max 100).
//!
//! Anything outside the grammar or the schema is rejected before the database
//! is touched.

mod params;

pub use params::{Field, FieldKind, Operator, QuerySchema};

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{options::FindOptions, Collection};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

const RESERVED_PARAMS: [&str; 4] = ["select", "sort", "page", "limit"];
const DEFAULT_SORT_FIELD: &str = "created_at";

/// A fully shaped list query for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    filter: Document,
    select: Option<Vec<String>>,
    sort: Document,
    page: u64,
    limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageRef>,
}

/// One page of results plus the unpaginated match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
}

/// The list envelope shared by every collection endpoint.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub count: usize,
    pub total: u64,
    pub pagination: Pagination,
    pub data: Vec<serde_json::Value>,
}

/// Next/previous page descriptors, emitted only when such a page exists.
pub fn paginate(page: u64, limit: u64, total: u64) -> Pagination {
    let start_index = page.saturating_sub(1).saturating_mul(limit);
    let end_index = page.saturating_mul(limit);

    Pagination {
        next: page
            .checked_add(1)
            .filter(|_| end_index < total)
            .map(|next| PageRef { page: next, limit }),
        prev: (start_index > 0).then_some(PageRef {
            page: page.saturating_sub(1),
            limit,
        }),
    }
}

/// Keep only `fields` (plus `id`) of a serialized JSON object.
pub fn select_fields(value: serde_json::Value, fields: &[String]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
                .collect(),
        ),
        other => other,
    }
}

impl ListQuery {
    /// Parse raw query-string pairs against `schema`.
    pub fn parse(params: &[(String, String)], schema: &QuerySchema) -> Result<Self, AppError> {
        let mut filter = Document::new();
        let mut select = None;
        let mut sort = None;
        let mut page = DEFAULT_PAGE;
        let mut limit = DEFAULT_LIMIT;

        for (key, raw) in params {
            match key.as_str() {
                "select" => select = Some(parse_select(raw, schema)?),
                "sort" => sort = Some(parse_sort(raw, schema)?),
                "page" => page = parse_positive("page", raw)?,
                "limit" => limit = parse_positive("limit", raw)?.min(MAX_LIMIT),
                _ => add_condition(&mut filter, key, raw, schema)?,
            }
        }

        // The driver takes skip as an i64.
        let in_range = (page - 1)
            .checked_mul(limit)
            .is_some_and(|skip| i64::try_from(skip).is_ok());
        if !in_range {
            return Err(AppError::bad_request("'page' is out of range"));
        }

        let sort = sort.unwrap_or_else(|| doc! { DEFAULT_SORT_FIELD: -1, "_id": 1 });

        Ok(Self {
            filter,
            select,
            sort,
            page,
            limit,
        })
    }

    /// AND a server-side scope into the filter. Scope keys replace any
    /// caller-supplied condition on the same field.
    pub fn scoped(mut self, scope: Document) -> Self {
        for (key, value) in scope {
            self.filter.insert(key, value);
        }
        self
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn sort(&self) -> &Document {
        &self.sort
    }

    pub fn select(&self) -> Option<&[String]> {
        self.select.as_deref()
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn find_options(&self) -> FindOptions {
        FindOptions::builder()
            .sort(self.sort.clone())
            .skip(self.skip())
            .limit(self.limit as i64)
            .build()
    }

    /// Run the count and the paginated find against `collection`.
    pub async fn fetch<T>(&self, collection: &Collection<T>) -> Result<Page<T>, AppError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let total = collection
            .count_documents(self.filter.clone(), None)
            .await?;

        let cursor = collection
            .find(self.filter.clone(), self.find_options())
            .await?;
        let items: Vec<T> = cursor.try_collect().await?;

        Ok(Page {
            items,
            total,
            pagination: paginate(self.page, self.limit, total),
        })
    }
}

impl<T> Page<T> {
    /// Serialize each item through `to_view`, apply `select`, and wrap the
    /// page in the list envelope.
    pub fn into_response<R, F>(self, query: &ListQuery, mut to_view: F) -> Result<ListResponse, AppError>
    where
        R: Serialize,
        F: FnMut(T) -> R,
    {
        let data = self
            .items
            .into_iter()
            .map(|item| {
                let value = serde_json::to_value(to_view(item))
                    .map_err(|e| AppError::InternalError(e.into()))?;
                Ok(match query.select() {
                    Some(fields) => select_fields(value, fields),
                    None => value,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(ListResponse {
            success: true,
            count: data.len(),
            total: self.total,
            pagination: self.pagination,
            data,
        })
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, AppError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(AppError::bad_request(format!(
            "'{}' must be a positive integer",
            name
        ))),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_select(raw: &str, schema: &QuerySchema) -> Result<Vec<String>, AppError> {
    let mut fields = Vec::new();
    for name in split_list(raw) {
        let field = schema.field(name)?;
        if !fields.iter().any(|f: &String| f == field.name) {
            fields.push(field.name.to_string());
        }
    }
    if fields.is_empty() {
        return Err(AppError::bad_request("'select' must name at least one field"));
    }
    Ok(fields)
}

fn parse_sort(raw: &str, schema: &QuerySchema) -> Result<Document, AppError> {
    let mut sort = Document::new();
    for token in split_list(raw) {
        let (name, direction) = match token.strip_prefix('-') {
            Some(name) => (name, -1),
            None => (token, 1),
        };
        let field = schema.field(name)?;
        field.ensure_comparable()?;
        let key = field.storage_key();
        if sort.contains_key(key) {
            return Err(AppError::bad_request(format!(
                "Field '{}' appears more than once in 'sort'",
                name
            )));
        }
        sort.insert(key, direction);
    }
    if sort.is_empty() {
        return Err(AppError::bad_request("'sort' must name at least one field"));
    }
    if !sort.contains_key("_id") {
        sort.insert("_id", 1);
    }
    Ok(sort)
}

fn add_condition(
    filter: &mut Document,
    key: &str,
    raw: &str,
    schema: &QuerySchema,
) -> Result<(), AppError> {
    let (name, operator) = Operator::split_key(key)?;
    if RESERVED_PARAMS.contains(&name) {
        return Err(AppError::bad_request(format!(
            "'{}' does not accept operators",
            name
        )));
    }
    let field = schema.field(name)?;
    let value = field.parse_operand(operator, raw)?;
    let storage_key = field.storage_key();

    match operator {
        Operator::Eq => {
            if filter.contains_key(storage_key) {
                return Err(AppError::bad_request(format!(
                    "Conflicting conditions for field '{}'",
                    name
                )));
            }
            filter.insert(storage_key, value);
        }
        _ => {
            match filter.get(storage_key) {
                Some(Bson::Document(_)) => {}
                Some(_) => {
                    return Err(AppError::bad_request(format!(
                        "Conflicting conditions for field '{}'",
                        name
                    )))
                }
                None => {
                    filter.insert(storage_key, Document::new());
                }
            }
            let conditions = filter
                .get_document_mut(storage_key)
                .map_err(|e| AppError::InternalError(e.into()))?;
            let mongo_op = operator.mongo_operator();
            if conditions.contains_key(mongo_op) {
                return Err(AppError::bad_request(format!(
                    "Operator '{}' given twice for field '{}'",
                    operator.as_str(),
                    name
                )));
            }
            conditions.insert(mongo_op, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[Field] = &[
        Field::new("id", FieldKind::Text),
        Field::new("name", FieldKind::Text),
        Field::new("category", FieldKind::Text),
        Field::new("phone", FieldKind::Text),
        Field::new("price", FieldKind::Number),
        Field::new("stock", FieldKind::Number),
        Field::new("is_active", FieldKind::Bool),
        Field::new("created_at", FieldKind::DateTime),
        Field::new("items", FieldKind::Embedded),
    ];
    const SCHEMA: QuerySchema = QuerySchema::new(FIELDS);

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<ListQuery, AppError> {
        ListQuery::parse(&params(pairs), &SCHEMA)
    }

    #[test]
    fn defaults_apply_without_parameters() {
        let query = parse(&[]).expect("empty query is valid");
        assert_eq!(query.filter(), &Document::new());
        assert_eq!(query.sort(), &doc! { "created_at": -1, "_id": 1 });
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), 10);
        assert_eq!(query.skip(), 0);
        assert!(query.select().is_none());
    }

    #[test]
    fn plain_parameters_become_typed_equality() {
        let query = parse(&[
            ("category", "seeds"),
            ("is_active", "true"),
            ("stock", "5"),
            ("phone", "9876543210"),
        ])
        .expect("valid filter");

        assert_eq!(
            query.filter(),
            &doc! {
                "category": "seeds",
                "is_active": true,
                "stock": 5_i64,
                "phone": "9876543210",
            }
        );
    }

    #[test]
    fn bracket_operators_are_rewritten_and_merged() {
        let query = parse(&[("price[gte]", "10"), ("price[lt]", "99.5")]).expect("valid filter");
        assert_eq!(
            query.filter(),
            &doc! { "price": { "$gte": 10_i64, "$lt": 99.5 } }
        );
    }

    #[test]
    fn in_operator_takes_a_typed_list() {
        let query = parse(&[("category[in]", "seeds, tools"), ("stock[in]", "1,2")])
            .expect("valid filter");
        assert_eq!(
            query.filter(),
            &doc! {
                "category": { "$in": ["seeds", "tools"] },
                "stock": { "$in": [1_i64, 2_i64] },
            }
        );
    }

    #[test]
    fn id_is_an_alias_for_the_storage_key() {
        let query = parse(&[("id", "abc"), ("sort", "id")]).expect("valid filter");
        assert_eq!(query.filter(), &doc! { "_id": "abc" });
        assert_eq!(query.sort(), &doc! { "_id": 1 });
    }

    #[test]
    fn sort_parses_direction_and_appends_tie_breaker() {
        let query = parse(&[("sort", "-price,name")]).expect("valid sort");
        assert_eq!(query.sort(), &doc! { "price": -1, "name": 1, "_id": 1 });
    }

    #[test]
    fn select_keeps_requested_fields_only() {
        let query = parse(&[("select", "name,price")]).expect("valid select");
        assert_eq!(
            query.select(),
            Some(&["name".to_string(), "price".to_string()][..])
        );

        let value = serde_json::json!({
            "id": "p1",
            "name": "Urea",
            "price": 266.5,
            "stock": 40,
        });
        let selected = select_fields(value, query.select().unwrap_or_default());
        assert_eq!(
            selected,
            serde_json::json!({ "id": "p1", "name": "Urea", "price": 266.5 })
        );
    }

    #[test]
    fn pagination_for_second_of_three_pages() {
        let query = parse(&[("page", "2"), ("limit", "10")]).expect("valid paging");
        assert_eq!(query.skip(), 10);

        let pagination = paginate(query.page(), query.limit(), 25);
        assert_eq!(pagination.next, Some(PageRef { page: 3, limit: 10 }));
        assert_eq!(pagination.prev, Some(PageRef { page: 1, limit: 10 }));
    }

    #[test]
    fn pagination_edges_omit_missing_pages() {
        let first = paginate(1, 10, 25);
        assert_eq!(first.prev, None);
        assert_eq!(first.next, Some(PageRef { page: 2, limit: 10 }));

        let last = paginate(3, 10, 25);
        assert_eq!(last.next, None);
        assert_eq!(last.prev, Some(PageRef { page: 2, limit: 10 }));

        let exact = paginate(1, 10, 10);
        assert_eq!(exact, Pagination::default());
    }

    #[test]
    fn oversized_page_is_rejected_before_the_driver() {
        for pairs in [
            vec![("page", "18446744073709551615")],
            vec![("page", "922337203685477581"), ("limit", "100")],
        ] {
            assert!(
                matches!(parse(&pairs), Err(AppError::BadRequest(_))),
                "expected rejection for {:?}",
                pairs
            );
        }

        let furthest = parse(&[("page", "92233720368547759"), ("limit", "100")])
            .expect("skip fits in i64");
        assert!(i64::try_from(furthest.skip()).is_ok());
    }

    #[test]
    fn pagination_at_the_last_page_number_has_no_next() {
        let pagination = paginate(u64::MAX, 10, u64::MAX);
        assert_eq!(pagination.next, None);
        assert_eq!(
            pagination.prev,
            Some(PageRef {
                page: u64::MAX - 1,
                limit: 10
            })
        );
    }

    #[test]
    fn embedded_fields_are_select_only() {
        let query = parse(&[("select", "name,items")]).expect("embedded field selectable");
        assert_eq!(
            query.select(),
            Some(&["name".to_string(), "items".to_string()][..])
        );

        for pairs in [
            vec![("items", "x")],
            vec![("items[in]", "a,b")],
            vec![("sort", "-items")],
        ] {
            assert!(
                matches!(parse(&pairs), Err(AppError::BadRequest(_))),
                "expected rejection for {:?}",
                pairs
            );
        }
    }

    #[test]
    fn limit_is_capped() {
        let query = parse(&[("limit", "5000")]).expect("valid limit");
        assert_eq!(query.limit(), MAX_LIMIT);
    }

    #[test]
    fn scope_overrides_caller_conditions() {
        let query = parse(&[("name", "x"), ("category", "tools")])
            .expect("valid filter")
            .scoped(doc! { "category": "seeds" });
        assert_eq!(query.filter(), &doc! { "name": "x", "category": "seeds" });
    }

    #[test]
    fn date_operands_accept_plain_dates() {
        let query = parse(&[("created_at[gte]", "2024-04-01")]).expect("valid date");
        let expected = bson::DateTime::parse_rfc3339_str("2024-04-01T00:00:00Z")
            .expect("valid timestamp");
        assert_eq!(
            query.filter(),
            &doc! { "created_at": { "$gte": expected } }
        );
    }

    #[test]
    fn malformed_input_fails_closed() {
        let rejected = [
            vec![("price[regex]", "1")],
            vec![("price[gt", "1")],
            vec![("price[gt][lt]", "1")],
            vec![("password_hash", "x")],
            vec![("$where", "1")],
            vec![("price", "cheap")],
            vec![("is_active[gt]", "true")],
            vec![("category[in]", " , ")],
            vec![("page", "0")],
            vec![("limit", "ten")],
            vec![("sort", "-unknown")],
            vec![("select", "password_hash")],
            vec![("price", "1"), ("price[gt]", "0")],
            vec![("price[gt]", "1"), ("price[gt]", "2")],
            vec![("page[gt]", "1")],
        ];

        for pairs in rejected {
            let result = parse(&pairs);
            assert!(
                matches!(result, Err(AppError::BadRequest(_))),
                "expected rejection for {:?}",
                pairs
            );
        }
    }
}
