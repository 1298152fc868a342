use super::mapping::{from_remote, to_remote};
use super::{Entity, RemoteBackend, RemoteError};
use crate::config::RemoteConfig;
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// HTTP backend for a `PostgREST` endpoint (`/rest/v1/{table}`).
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    token: String,
}

impl RestBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            token: config.access_token.clone().unwrap_or_else(|| config.api_key.clone()),
        })
    }

    fn endpoint(&self, entity: Entity) -> String {
        format!("{}/rest/v1/{}", self.base_url, entity.table())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.token))
    }

    fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl RemoteBackend for RestBackend {
    fn list(&self, entity: Entity, owner: &str) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .client
            .get(self.endpoint(entity))
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{owner}"))]);
        let response = Self::check(self.authorized(request).send()?)?;

        match response.json::<Value>()? {
            Value::Array(rows) => {
                debug!("Fetched {} {entity} row(s)", rows.len());
                Ok(rows.iter().map(|row| from_remote(entity, row)).collect())
            }
            other => Err(RemoteError::InvalidResponse(format!(
                "expected an array of {entity}, got {other}"
            ))),
        }
    }

    fn create(&self, entity: Entity, owner: &str, record: &Value) -> Result<(), RemoteError> {
        let mut row = to_remote(record);
        if let Value::Object(fields) = &mut row {
            fields.insert("user_id".into(), Value::String(owner.to_string()));
        }
        let request = self
            .client
            .post(self.endpoint(entity))
            .header("Prefer", "return=minimal")
            .json(&row);
        Self::check(self.authorized(request).send()?)?;
        Ok(())
    }

    fn update(&self, entity: Entity, id: &str, partial: &Value) -> Result<(), RemoteError> {
        let request = self
            .client
            .patch(self.endpoint(entity))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&to_remote(partial));
        Self::check(self.authorized(request).send()?)?;
        Ok(())
    }

    fn delete(&self, entity: Entity, id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.endpoint(entity))
            .query(&[("id", format!("eq.{id}"))]);
        Self::check(self.authorized(request).send()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn backend(url: &str) -> RestBackend {
        RestBackend::new(&RemoteConfig {
            url: url.to_string(),
            api_key: "anon".into(),
            access_token: Some("jwt".into()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_list_maps_rows_and_sends_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "eq.u1".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
            ]))
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer jwt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"t1","title":"Remote","due_date":"2024-01-16","user_id":"u1"}]"#)
            .create();

        let rows = backend(&server.url()).list(Entity::Tasks, "u1").unwrap();

        mock.assert();
        assert_eq!(rows, vec![json!({"id": "t1", "title": "Remote", "dueDate": "2024-01-16"})]);
    }

    #[test]
    fn test_create_adds_owner_and_snake_cases() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/rest/v1/blocked_apps")
            .match_body(Matcher::Json(json!({
                "id": "s1", "url": "x.com", "is_enabled": true, "block_mode": "focus", "user_id": "u1"
            })))
            .with_status(201)
            .create();

        backend(&server.url())
            .create(
                Entity::BlockedSites,
                "u1",
                &json!({"id": "s1", "url": "x.com", "isEnabled": true, "blockMode": "focus"}),
            )
            .unwrap();
        mock.assert();
    }

    #[test]
    fn test_update_and_delete_filter_by_id() {
        let mut server = mockito::Server::new();
        let patch = server
            .mock("PATCH", "/rest/v1/tasks")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.t1".into()))
            .match_body(Matcher::Json(json!({"completed": true})))
            .with_status(204)
            .create();
        let delete = server
            .mock("DELETE", "/rest/v1/focus_sessions")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.f1".into()))
            .with_status(204)
            .create();

        let backend = backend(&server.url());
        backend.update(Entity::Tasks, "t1", &json!({"completed": true})).unwrap();
        backend.delete(Entity::FocusSessions, "f1").unwrap();

        patch.assert();
        delete.assert();
    }

    #[test]
    fn test_error_status_is_reported() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("no auth")
            .create();

        let err = backend(&server.url()).list(Entity::Tasks, "u1").unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 401, .. }));
    }

    #[test]
    fn test_non_array_body_is_invalid() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"message":"nope"}"#)
            .create();

        let err = backend(&server.url()).list(Entity::Tasks, "u1").unwrap_err();
        assert!(matches!(err, RemoteError::InvalidResponse(_)));
    }
}
