//! Wire payloads exchanged with the registration service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A goods-introduction document submitted for registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub doc_status: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(rename = "importRequest", default)]
    pub import_request: bool,
    #[serde(default)]
    pub owner_inn: String,
    #[serde(default)]
    pub participant_inn: String,
    #[serde(default)]
    pub producer_inn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
    #[serde(default)]
    pub production_type: String,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg_number: Option<String>,
}

/// Participant block of a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

/// One line item of a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_number: Option<String>,
    #[serde(default)]
    pub owner_inn: String,
    #[serde(default)]
    pub producer_inn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
    #[serde(default)]
    pub tnved_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uitu_code: Option<String>,
}

/// Credentials posted to the authentication endpoint.
#[derive(Clone, Serialize)]
pub struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl std::fmt::Debug for AuthRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body returned by a successful authentication.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        Document {
            description: Some(Description {
                participant_inn: "1234567890".to_string(),
            }),
            doc_id: "12345".to_string(),
            doc_status: "NEW".to_string(),
            doc_type: "LP_INTRODUCE_GOODS".to_string(),
            import_request: true,
            owner_inn: "0987654321".to_string(),
            participant_inn: "1234567890".to_string(),
            producer_inn: "5678901234".to_string(),
            production_date: Some(date),
            production_type: "OWN_PRODUCTION".to_string(),
            products: vec![Product {
                tnved_code: "6401100000".to_string(),
                uit_code: Some("uit".to_string()),
                production_date: Some(date),
                ..Product::default()
            }],
            reg_date: Some(date),
            reg_number: None,
        }
    }

    #[test]
    fn test_document_wire_names() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(value["description"]["participantInn"], json!("1234567890"));
        assert_eq!(value["importRequest"], json!(true));
        assert_eq!(value["doc_type"], json!("LP_INTRODUCE_GOODS"));
        assert_eq!(value["production_date"], json!("2024-07-01"));
        assert_eq!(value["products"][0]["tnved_code"], json!("6401100000"));
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("reg_number").is_none());
        assert!(value["products"][0].get("certificate_document").is_none());
        assert!(value["products"][0].get("uitu_code").is_none());
    }

    #[test]
    fn test_parse_partial_document() {
        let document: Document =
            serde_json::from_str(r#"{"doc_id":"7","products":[{"tnved_code":"1"}]}"#).unwrap();
        assert_eq!(document.doc_id, "7");
        assert!(!document.import_request);
        assert_eq!(document.products.len(), 1);
        assert!(document.description.is_none());
    }

    #[test]
    fn test_auth_payloads() {
        let request = AuthRequest {
            username: "user",
            password: "hunter2",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"username": "user", "password": "hunter2"})
        );
        assert!(!format!("{:?}", request).contains("hunter2"));

        let response: AuthResponse = serde_json::from_str(r#"{"token":"t0k"}"#).unwrap();
        assert_eq!(response.token, "t0k");
        assert!(!format!("{:?}", response).contains("t0k"));
    }
}
