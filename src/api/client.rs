// src/api/client.rs
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::budget::{ExpenseDetail, NodeKind, OrganizationStructure, Subcategory};
use crate::config::ApiConfig;
use crate::errors::ApiError;

use super::requests::{
    CreateCategoryReq, CreateDepartmentReq, CreateSubcategoryReq, DecisionReq, UpdateNodeReq,
};

type ApiResult<T> = Result<T, ApiError>;

const GENERIC_FAILURE: &str = "Request failed";

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Client {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("expense-budget-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ============= Organization =============

    pub async fn organization_structure(&self, year_id: Option<i64>) -> ApiResult<OrganizationStructure> {
        let mut req = self.request(Method::GET, "/organization/structure");
        if let Some(year) = year_id {
            req = req.query(&[("year_id", year)]);
        }
        let structure: OrganizationStructure = read_json(req.send().await?).await?;
        log::info!(
            "Fetched organization structure: {} departments (view_only={})",
            structure.structure.len(),
            structure.view_only
        );
        Ok(structure)
    }

    pub async fn create_department(&self, req: &CreateDepartmentReq) -> ApiResult<()> {
        let resp = self.request(Method::POST, "/organization/departments").json(req).send().await?;
        expect_success(resp).await
    }

    pub async fn create_category(&self, req: &CreateCategoryReq) -> ApiResult<()> {
        let resp = self.request(Method::POST, "/organization/categories").json(req).send().await?;
        expect_success(resp).await
    }

    pub async fn create_subcategory(&self, req: &CreateSubcategoryReq) -> ApiResult<()> {
        let resp = self.request(Method::POST, "/organization/subcategories").json(req).send().await?;
        expect_success(resp).await
    }

    pub async fn update_node(&self, kind: NodeKind, id: i64, req: &UpdateNodeReq) -> ApiResult<()> {
        let path = format!("/organization/{}/{}", kind.as_path(), id);
        let resp = self.request(Method::PUT, &path).json(req).send().await?;
        expect_success(resp).await
    }

    /// Deleting a category also removes its subcategories on the server.
    pub async fn delete_node(&self, kind: NodeKind, id: i64) -> ApiResult<()> {
        let path = format!("/organization/{}/{}", kind.as_path(), id);
        let resp = self.request(Method::DELETE, &path).send().await?;
        expect_success(resp).await
    }

    pub async fn welfare_subcategories(&self, category_id: i64) -> ApiResult<Vec<Subcategory>> {
        let path = format!("/organization/categories/{category_id}/subcategories");
        read_json(self.request(Method::GET, &path).send().await?).await
    }

    // ============= Expenses =============

    pub async fn expense(&self, expense_id: i64) -> ApiResult<ExpenseDetail> {
        let path = format!("/expenses/{expense_id}");
        read_json(self.request(Method::GET, &path).send().await?).await
    }

    pub async fn approve_expense(&self, expense_id: i64, req: &DecisionReq) -> ApiResult<()> {
        let path = format!("/expenses/{expense_id}/approve");
        expect_success(self.request(Method::POST, &path).json(req).send().await?).await
    }

    pub async fn reject_expense(&self, expense_id: i64, req: &DecisionReq) -> ApiResult<()> {
        let path = format!("/expenses/{expense_id}/reject");
        expect_success(self.request(Method::POST, &path).json(req).send().await?).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let resp = check_status(resp).await?;
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Mutation bodies are ignored; callers re-fetch instead.
async fn expect_success(resp: Response) -> ApiResult<()> {
    check_status(resp).await.map(|_| ())
}

async fn check_status(resp: Response) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body);
    log::warn!("API request failed with {}: {}", status, message);
    Err(ApiError::Status { status: status.as_u16(), message })
}

/// Human-readable message from an error body, or a generic fallback.
pub fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                if !msg.trim().is_empty() {
                    return msg.trim().to_string();
                }
            }
        }
        return GENERIC_FAILURE.to_string();
    }
    let text = body.trim();
    if text.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        text.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefers_known_fields() {
        assert_eq!(error_message(r#"{"message":"Name already taken"}"#), "Name already taken");
        assert_eq!(error_message(r#"{"detail":"Not found."}"#), "Not found.");
        assert_eq!(error_message(r#"{"error":"  ","detail":"Budget must be positive"}"#), "Budget must be positive");
    }

    #[test]
    fn message_falls_back() {
        assert_eq!(error_message(""), GENERIC_FAILURE);
        assert_eq!(error_message(r#"{"code":42}"#), GENERIC_FAILURE);
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn base_url_is_trimmed() {
        let client = Client::new(&ApiConfig { base_url: "http://localhost:3000/api/".into(), token: None }).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
    }
}
