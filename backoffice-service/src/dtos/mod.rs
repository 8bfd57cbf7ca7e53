pub mod customers;
pub mod invoices;
pub mod products;
pub mod users;

use serde::Serialize;

/// Success envelope for single resources and unpaginated collections.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            count: None,
            data,
            token: None,
        }
    }

    pub fn with_token(data: T, token: String) -> Self {
        Self {
            token: Some(token),
            ..Self::ok(data)
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn collection(data: Vec<T>) -> Self {
        Self {
            count: Some(data.len()),
            ..Self::ok(data)
        }
    }
}

/// Body-less success, e.g. after a delete.
#[derive(Debug, Serialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_resource_envelope_omits_count_and_token() {
        let value = serde_json::to_value(ApiResponse::ok(Empty {})).expect("serializable");
        assert_eq!(value, serde_json::json!({ "success": true, "data": {} }));
    }

    #[test]
    fn collection_envelope_carries_count() {
        let value = serde_json::to_value(ApiResponse::collection(vec![1, 2, 3])).expect("serializable");
        assert_eq!(value["count"], 3);
        assert_eq!(value["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn token_is_included_when_present() {
        let value = serde_json::to_value(ApiResponse::with_token(Empty {}, "jwt".to_string()))
            .expect("serializable");
        assert_eq!(value["token"], "jwt");
    }
}
