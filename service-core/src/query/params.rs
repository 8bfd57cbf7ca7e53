use bson::Bson;

use crate::error::AppError;

/// Comparison operators accepted in `field[op]=value` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
        }
    }

    pub fn mongo_operator(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "in" => Some(Operator::In),
            _ => None,
        }
    }

    /// Split `price[gte]` into (`price`, Gte); a bare key is equality.
    pub fn split_key(key: &str) -> Result<(&str, Operator), AppError> {
        if key.is_empty() {
            return Err(AppError::bad_request("Empty query parameter name"));
        }
        if key.starts_with('$') {
            return Err(AppError::bad_request(format!(
                "Query parameter '{}' is not allowed",
                key
            )));
        }

        let Some(open) = key.find('[') else {
            if key.contains(']') {
                return Err(malformed(key));
            }
            return Ok((key, Operator::Eq));
        };

        let name = &key[..open];
        let rest = &key[open + 1..];
        let token = rest.strip_suffix(']').ok_or_else(|| malformed(key))?;
        if name.is_empty() || token.contains('[') || token.contains(']') {
            return Err(malformed(key));
        }

        let operator = Operator::from_token(token).ok_or_else(|| {
            AppError::bad_request(format!(
                "Unsupported operator '{}' on '{}' (expected gt, gte, lt, lte or in)",
                token, name
            ))
        })?;

        Ok((name, operator))
    }
}

fn malformed(key: &str) -> AppError {
    AppError::bad_request(format!("Malformed query parameter '{}'", key))
}

/// How raw string operands are typed before they reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    DateTime,
    /// Sub-document or array: selectable only.
    Embedded,
}

/// A field clients may filter, sort and select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    /// Document key the field is stored under (`id` lives in `_id`).
    pub fn storage_key(&self) -> &'static str {
        if self.name == "id" {
            "_id"
        } else {
            self.name
        }
    }

    pub fn is_comparable(&self) -> bool {
        self.kind != FieldKind::Embedded
    }

    pub(crate) fn ensure_comparable(&self) -> Result<(), AppError> {
        if self.is_comparable() {
            Ok(())
        } else {
            Err(self.select_only())
        }
    }

    fn select_only(&self) -> AppError {
        AppError::bad_request(format!("'{}' can only be used in 'select'", self.name))
    }

    pub(crate) fn parse_operand(&self, operator: Operator, raw: &str) -> Result<Bson, AppError> {
        self.ensure_comparable()?;
        match operator {
            Operator::In => {
                let values = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|item| self.parse_scalar(item))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.is_empty() {
                    return Err(AppError::bad_request(format!(
                        "'{}[in]' needs at least one value",
                        self.name
                    )));
                }
                Ok(Bson::Array(values))
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
                if self.kind == FieldKind::Bool =>
            {
                Err(AppError::bad_request(format!(
                    "'{}' only supports equality",
                    self.name
                )))
            }
            _ => self.parse_scalar(raw.trim()),
        }
    }

    fn parse_scalar(&self, raw: &str) -> Result<Bson, AppError> {
        let invalid = |expected: &str| {
            AppError::bad_request(format!(
                "'{}' expects {}, got '{}'",
                self.name, expected, raw
            ))
        };

        match self.kind {
            FieldKind::Text => Ok(Bson::String(raw.to_string())),
            FieldKind::Embedded => Err(self.select_only()),
            FieldKind::Bool => match raw {
                "true" => Ok(Bson::Boolean(true)),
                "false" => Ok(Bson::Boolean(false)),
                _ => Err(invalid("true or false")),
            },
            FieldKind::Number => {
                if let Ok(int) = raw.parse::<i64>() {
                    return Ok(Bson::Int64(int));
                }
                match raw.parse::<f64>() {
                    Ok(float) if float.is_finite() => Ok(Bson::Double(float)),
                    _ => Err(invalid("a number")),
                }
            }
            FieldKind::DateTime => {
                let candidate = if raw.len() == 10 {
                    format!("{}T00:00:00Z", raw)
                } else {
                    raw.to_string()
                };
                bson::DateTime::parse_rfc3339_str(&candidate)
                    .map(Bson::DateTime)
                    .map_err(|_| invalid("an RFC 3339 timestamp or YYYY-MM-DD date"))
            }
        }
    }
}

/// The allow-list of fields a resource exposes to list queries.
#[derive(Debug, Clone, Copy)]
pub struct QuerySchema {
    fields: &'static [Field],
}

impl QuerySchema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Result<&Field, AppError> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| AppError::bad_request(format!("Unknown field '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_key_recognizes_operators() {
        assert_eq!(Operator::split_key("price").ok(), Some(("price", Operator::Eq)));
        assert_eq!(
            Operator::split_key("price[lte]").ok(),
            Some(("price", Operator::Lte))
        );
        assert_eq!(
            Operator::split_key("category[in]").ok(),
            Some(("category", Operator::In))
        );
    }

    #[test]
    fn split_key_rejects_malformed_keys() {
        for key in ["", "[gt]", "price]", "price[gt", "price[ne]", "$or", "a[gt]x"] {
            assert!(Operator::split_key(key).is_err(), "{} should be rejected", key);
        }
    }

    #[test]
    fn number_operands_prefer_integers() {
        let field = Field::new("stock", FieldKind::Number);
        assert_eq!(
            field.parse_operand(Operator::Eq, "12").ok(),
            Some(Bson::Int64(12))
        );
        assert_eq!(
            field.parse_operand(Operator::Gt, "12.5").ok(),
            Some(Bson::Double(12.5))
        );
        assert!(field.parse_operand(Operator::Gt, "NaN").is_err());
    }

    #[test]
    fn embedded_fields_reject_every_operator() {
        let field = Field::new("items", FieldKind::Embedded);
        assert!(!field.is_comparable());
        for operator in [Operator::Eq, Operator::Gt, Operator::In] {
            assert!(
                matches!(
                    field.parse_operand(operator, "x"),
                    Err(AppError::BadRequest(_))
                ),
                "{:?} accepted on an embedded field",
                operator
            );
        }
    }
}
